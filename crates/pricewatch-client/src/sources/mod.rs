//! Built-in source adapters.

pub mod books;
pub mod ecommerce;

use std::sync::Arc;

use pricewatch_core::adapter::SourceRegistry;

pub use books::BooksAdapter;
pub use ecommerce::EcommerceAdapter;

/// Registry holding every built-in adapter.
pub fn default_registry() -> SourceRegistry {
    SourceRegistry::new()
        .register(Arc::new(BooksAdapter::new()))
        .register(Arc::new(EcommerceAdapter::new()))
}
