pub mod parser;
pub mod transport;

pub use parser::ShellyParser;
pub use transport::{ReqwestTransport, TransportOptions};
