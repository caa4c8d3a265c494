//! Domain types shared by the coordination substrate and its consumers.

#![forbid(unsafe_code)]

mod keys;
mod read_options;
mod resource;

pub use keys::{
    WRITE_FLAG_KEY_PREFIX, create_tag_lock_key, update_tag_lock_key, write_flag_key_by_id,
    write_flag_key_by_scope,
};
pub use read_options::{ReadOption, ReadOptions, TransactionHandle};
pub use resource::ResourceKind;
