pub mod routes;
pub mod session;
pub mod startup;
pub mod errors;
pub mod openapi;

pub use startup::run;
