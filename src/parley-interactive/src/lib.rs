//! Interactive input for text commands.
//!
//! A command handler that needs a follow-up answer ("are you sure?", "pick a
//! page") subscribes to the host's incoming messages through an
//! [`InputBroker`] and waits for the first message its filter accepts. The
//! wait races a timeout and a [`CancellationToken`]; whichever completes
//! first decides the [`InputOutcome`], and the subscription is released as
//! soon as the wait returns.
//!
//! ```rust,ignore
//! use std::time::Duration;
//! use parley_interactive::{InputBroker, InputOutcome};
//! use tokio_util::sync::CancellationToken;
//!
//! let broker: InputBroker<String> = InputBroker::new();
//! let cancel = CancellationToken::new();
//!
//! match broker
//!     .next_input(|m| m == "yes" || m == "no", Duration::from_secs(30), &cancel)
//!     .await
//! {
//!     InputOutcome::Received(answer) => println!("answered {answer}"),
//!     InputOutcome::TimedOut => println!("no answer"),
//!     InputOutcome::Cancelled => {}
//! }
//! ```
//!
//! [`CancellationToken`]: tokio_util::sync::CancellationToken

mod broker;

pub use broker::{InputBroker, InputOutcome, Subscription};
