pub mod event;
pub mod response;

pub use event::EventRepository;
pub use response::ResponseRepository;
