//! HTTP front end for stream2cca.
//!
//! One server answers three kinds of request:
//!
//! - `POST /` with a plain-text command (`volume_up`, `get_status`,
//!   `select_device 3`, ...) runs it through the [`cca_player::Controller`].
//!   Unknown commands get `400`.
//! - `GET` for an audio file serves it from the serve root, the common
//!   ancestor of the web directory and the playlist folder, so the cast
//!   receiver can stream it.
//! - Any other `GET` serves the control page and its assets from the web
//!   directory. `/` redirects to the page and `/ip_address.js` tells it
//!   where to send commands.
//!
//! Every response disables caching so the page always shows the current
//! cover art.

mod config;
mod error;
mod routes;
mod server;

pub use config::{common_ancestor, ServerConfig, CONTROL_PAGE, COVER_IMAGE, DEFAULT_PORT};
pub use error::{Result, ServerError};
pub use server::{local_ip, CommandServer};
