use std::sync::Arc;

use teloxide::prelude::*;

use crate::{
    errors::HandlerResult,
    session::{Event, Pipeline},
};

pub async fn cancel(msg: Message, pipeline: Arc<Pipeline>) -> HandlerResult {
    if let Some(user) = msg.from.as_ref() {
        pipeline.handle(user.id, msg.chat.id, Event::Cancel).await?;
    }
    Ok(())
}
