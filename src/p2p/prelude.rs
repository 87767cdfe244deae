pub use crate::{Error, Result};

pub use crate::id::Id;
pub use crate::ucp::{Command, CommandKind};

pub use actix::{Actor, Handler, Recipient};
pub use actix::{AsyncContext, Context};

pub use tokio::time::{timeout, Duration};

pub use std::sync::Arc;

pub use futures::{SinkExt, StreamExt};

pub use crate::colored::Colorize;

pub use tracing::{debug, error, info, warn};
