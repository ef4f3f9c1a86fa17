pub mod fanout;
pub mod history;
pub mod non_stream;
pub mod persona;
pub mod request;
pub mod stream;
pub mod turn;

pub use fanout::{fan_out, FanOutItem};
pub use non_stream::{run_non_stream, NonStreamTurn};
pub use request::ChatTurnInput;
pub use stream::{run_stream, StreamFrame, StreamItem};
pub use turn::{ChatOrchestrator, PreparedTurn};
