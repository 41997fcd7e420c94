pub mod db_writer;

pub use db_writer::{insert_chunks, insert_document, NewChunk};
