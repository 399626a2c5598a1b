mod batch;
mod client;
mod common;
mod fake;
mod kv;
mod query;
mod scan;
mod task;
mod validation;
