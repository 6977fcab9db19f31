//! Discovery of repositories that depend on a Go package.

mod importers;

pub use importers::{
    DiscoveryError, PKG_GO_DEV, importers_of, importers_url, normalize_package_path,
    parse_importers, repository_root,
};
