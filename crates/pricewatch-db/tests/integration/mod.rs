mod job_queue_tests;
mod merge_tests;
mod query_tests;
