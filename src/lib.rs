pub mod body;
pub mod config;
pub mod exception;
pub mod header;
pub mod param;
pub mod request;
pub mod response;
pub mod session;
pub mod storage;
pub mod transport;
pub mod util;

pub use config::Config;
pub use exception::Exception;
pub use header::HeaderStore;
pub use param::HttpVersion;
pub use request::{Environment, Filter, Request};
pub use response::Response;
pub use session::{FlashMessage, Session, Timeout};
pub use storage::{CookieParams, FileStorage, MemoryStorage, SessionOptions, SessionStorage};
pub use transport::{MemoryTransport, Transport, WriterTransport};
