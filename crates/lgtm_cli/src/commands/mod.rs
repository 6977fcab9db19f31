pub(crate) mod follow;
pub(crate) mod lists;
pub(crate) mod meta;
pub(crate) mod query;
pub(crate) mod rebuild;
pub(crate) mod shared;
pub(crate) mod unfollow;
