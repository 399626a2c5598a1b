#![forbid(unsafe_code)]
#![warn(
    rust_2018_idioms,
    clippy::all,
    clippy::pedantic,
    clippy::clone_on_ref_ptr,
    clippy::format_push_string,
    clippy::get_unwrap,
    clippy::mem_forget,
    clippy::mutex_atomic,
    clippy::rc_buffer,
    clippy::rc_mutex,
    clippy::self_named_module_files,
    clippy::str_to_string,
    clippy::wildcard_imports,
    clippy::string_add,
    clippy::string_to_string,
    clippy::try_err,
    clippy::unreachable
)]
#![allow(
    clippy::cast_possible_truncation,
    clippy::module_name_repetitions,
    clippy::similar_names,
    clippy::too_many_lines,
    clippy::missing_errors_doc,
    clippy::manual_let_else,
    missing_docs
)]

//! A partition-aware async client for the Aerospike `NoSQL` database.
//!
//! The [`Client`] keeps a live view of the cluster: its nodes and the owner of each of the 4096
//! partitions of every namespace. Single record commands go straight to the node that owns the
//! record, batches are split per node, and scans and queries stream the records of many
//! partitions into one [`Recordset`](query::Recordset).
//!
//! # Examples
//!
//! The following is a very simple example of CRUD operations in an Aerospike database.
//!
//! ```rust,no_run
//! use std::{sync::Arc, time::Instant};
//!
//! use windpike::{
//!     operations::scalar,
//!     policies::{BasePolicy, ClientPolicy, WritePolicy},
//!     Bin, Bins, Client, Key,
//! };
//!
//! #[tokio::main]
//! async fn main() {
//!     let client = Client::new(&ClientPolicy::default(), "localhost:3000")
//!         .await
//!         .expect("Failed to connect to cluster");
//!     let client = Arc::new(client);
//!
//!     let mut tasks = vec![];
//!     let now = Instant::now();
//!     for i in 0..2 {
//!         let client = Arc::clone(&client);
//!         let t = tokio::spawn(async move {
//!             let rpolicy = BasePolicy::default();
//!             let wpolicy = WritePolicy::default();
//!             let key = Key::new("test", "test", i);
//!             let bins = [Bin::new("int", 123), Bin::new("str", "Hello, World!")];
//!
//!             client.put(&wpolicy, &key, &bins).await.unwrap();
//!             let rec = client.get(&rpolicy, &key, Bins::All).await.unwrap();
//!             println!("Record: {rec:?}");
//!
//!             client.touch(&wpolicy, &key).await.unwrap();
//!             let rec = client.get_header(&rpolicy, &key).await.unwrap();
//!             println!("Record Header: {rec:?}");
//!
//!             let exists = client.exists(&rpolicy, &key).await.unwrap();
//!             println!("exists: {exists}");
//!
//!             let bin = Bin::new("int", 999);
//!             let ops = [scalar::put(&bin), scalar::get()];
//!             let op_rec = client.operate(&wpolicy, &key, &ops).await.unwrap();
//!             println!("operate: {op_rec:?}");
//!
//!             let existed = client.delete(&wpolicy, &key).await.unwrap();
//!             println!("existed (should be true): {existed}");
//!
//!             let existed = client.delete(&wpolicy, &key).await.unwrap();
//!             println!("existed (should be false): {existed}");
//!         });
//!
//!         tasks.push(t);
//!     }
//!
//!     for t in tasks {
//!         t.await.unwrap();
//!     }
//!
//!     println!("total time: {:?}", now.elapsed());
//! }
//! ```

pub use bin::{Bin, Bins};
pub use client::Client;
pub use cluster::{FeatureSupport, Node};
pub use key::{Key, UserKey};
pub use net::{FrameStream, Host, TcpTransport, ToHosts, Transport};
pub use record::Record;
pub use registry::ClientRegistry;
pub use result_code::ResultCode;
pub use value::{FloatValue, MapKey, Value};

pub mod batch;
mod bin;
mod client;
mod cluster;
mod commands;
pub mod errors;
pub mod exp;
mod key;
#[macro_use]
mod macros;
mod msgpack;
mod net;
pub mod operations;
pub mod policies;
pub mod query;
mod record;
mod registry;
mod result_code;
pub mod task;
pub mod udf;
pub mod user;
mod value;
