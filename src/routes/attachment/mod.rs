mod handler;
mod model;
mod store;

pub use handler::{attach_asset, attach_link, detach_asset, detach_link, list_attachments};
pub use model::{
    Asset, AttachmentId, Attachments, Link, NewAsset, NewLink, Owner, OwnerKind, OwnerRef,
    classify_link, classify_upload, parse_link_url,
};
pub use store::{AttachmentStore, MAX_LINK_NAME_CHARS, MAX_LINK_URL_CHARS};
