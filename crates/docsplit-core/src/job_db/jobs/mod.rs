//! Job row CRUD, split into reads and writes.

mod read;
mod write;
