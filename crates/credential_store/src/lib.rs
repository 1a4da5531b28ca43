//! On-disk state for the notebook bridge: browser session credentials and
//! conversation history.
//!
//! Both files are rewritten whole on every save (write to a sibling staging
//! file, then rename), so concurrent external writers never observe a torn
//! file. Readers re-read from disk on every call instead of caching.

mod conversations;
mod error;
mod paths;
mod schema;
mod store;

pub use conversations::{ConversationMap, ConversationStore};
pub use error::StoreError;
pub use paths::{auth_file, conversations_file, data_root, DATA_DIR_NAME};
pub use schema::{
    now_unix, parse_cookie_header, validate_cookies, ConversationTurn, Credentials,
    REQUIRED_COOKIES,
};
pub use store::CredentialStore;
