//! Page cursor encoding for `list_messages` (§4.4).
//!
//! Folder enumeration happens once per session and is cached by the
//! adapter; the opaque page token only needs to carry where within that
//! cached, sorted folder list the caller left off.

/// Where a `list_messages` page left off: the index into the cached,
/// sorted folder list, and the highest UID already returned in that folder.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PageCursor {
    pub folder_index: usize,
    pub after_uid: u32,
}

impl PageCursor {
    pub fn parse(token: Option<&str>) -> Self {
        token.and_then(Self::try_parse).unwrap_or_default()
    }

    fn try_parse(token: &str) -> Option<Self> {
        let (idx, uid) = token.split_once(':')?;
        Some(Self {
            folder_index: idx.parse().ok()?,
            after_uid: uid.parse().ok()?,
        })
    }

    pub fn encode(&self) -> String {
        format!("{}:{}", self.folder_index, self.after_uid)
    }
}
