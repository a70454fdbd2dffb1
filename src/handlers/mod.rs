mod callback_received;
mod media_received;
mod payment;

pub use callback_received::callback_received;
pub use media_received::{incoming_event, media_received};
pub use payment::{handle_pre_checkout_query, handle_successful_payment};
