pub mod check;
pub mod cleanup;
pub mod status;
pub mod sync;
