pub mod dcf;
pub mod projection;
