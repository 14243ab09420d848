//! [`RemoteAdapter`] implementation for the mailbox-protocol variant (§4.4).
//!
//! Remote message ids are composite `"<folder>|<uid>"` strings; a folder's
//! name also doubles as its one label, since a generic mailbox protocol has
//! no separate label concept beyond folder membership. History replay has
//! no equivalent here and returns an explicit error — `mailvault-ingest`
//! only calls `list_history` for `SourceKind::JsonApi` sources.

use std::collections::HashMap;
use std::sync::Arc;

use async_imap::types::NameAttribute;
use futures_util::StreamExt;
use mailvault_core::domain::{Cursor, RemoteLabelId, RemoteMessageId, RemoteThreadId};
use mailvault_core::ports::{
    HistoryPage, RemoteAdapter, RemoteError, RemoteLabel, RemoteMessageSummary, RemotePage, RemoteProfile,
};
use mailvault_transport::RateLimiter;
use tokio::sync::Mutex as AsyncMutex;

use crate::connection::{imap_error, ImapConfig, ImapSession, SessionHandle};
use crate::folder::PageCursor;

fn domain_err(e: mailvault_core::domain::errors::DomainError) -> RemoteError {
    RemoteError::Other(e.to_string())
}

/// Splits a composite `"<folder>|<uid>"` remote id back into its parts.
fn parse_remote_id(id: &RemoteMessageId) -> Result<(String, u32), RemoteError> {
    let raw = id.as_str();
    let (folder, uid) = raw
        .split_once('|')
        .ok_or_else(|| RemoteError::Other(format!("malformed mailbox message id: {raw}")))?;
    let uid = uid
        .parse::<u32>()
        .map_err(|_| RemoteError::Other(format!("malformed mailbox message id: {raw}")))?;
    Ok((folder.to_string(), uid))
}

fn build_uid_sequence(uids: &[u32]) -> String {
    uids.iter().map(ToString::to_string).collect::<Vec<_>>().join(",")
}

/// Selects `folder` and fetches one page of message summaries with UIDs
/// strictly greater than `after_uid`, up to `page_size` items. Returns the
/// fetched `(uid, summary)` pairs alongside whether the folder is now fully
/// drained (no more UIDs remain beyond this page).
async fn select_and_page(
    session: &mut ImapSession,
    folder: &str,
    after_uid: u32,
    page_size: u32,
) -> Result<(Vec<(u32, RemoteMessageSummary)>, bool), RemoteError> {
    session.select(folder).await.map_err(imap_error)?;

    let query = format!("UID {}:*", after_uid as u64 + 1);
    let found = session.uid_search(&query).await.map_err(imap_error)?;
    let mut uids: Vec<u32> = found.into_iter().filter(|&u| u > after_uid).collect();
    uids.sort_unstable();

    let exhausted = uids.len() as u32 <= page_size;
    uids.truncate(page_size as usize);

    if uids.is_empty() {
        return Ok((Vec::new(), true));
    }

    let label_id = RemoteLabelId::new(folder.to_string()).map_err(domain_err)?;
    let seq = build_uid_sequence(&uids);
    let mut stream = session.uid_fetch(&seq, "(UID)").await.map_err(imap_error)?;

    let mut items = Vec::new();
    while let Some(fetch) = stream.next().await {
        let fetch = fetch.map_err(imap_error)?;
        let Some(uid) = fetch.uid else { continue };
        let id = RemoteMessageId::new(format!("{folder}|{uid}")).map_err(domain_err)?;
        // The mailbox protocol has no native thread id; using the message's
        // own id here signals "no list-response thread id" so the ingest
        // worker falls through to the raw MIME's Message-ID-derived thread key.
        let thread_id = RemoteThreadId::new(id.as_str().to_string()).map_err(domain_err)?;
        items.push((
            uid,
            RemoteMessageSummary {
                id,
                thread_id,
                label_ids: vec![label_id.clone()],
            },
        ));
    }
    drop(stream);

    Ok((items, exhausted))
}

/// Selects `folder` and fetches the raw bytes of every uid in `uids`.
async fn fetch_raw_bodies(
    session: &mut ImapSession,
    folder: &str,
    uids: &[u32],
) -> Result<Vec<(u32, Vec<u8>)>, RemoteError> {
    if uids.is_empty() {
        return Ok(Vec::new());
    }
    session.select(folder).await.map_err(imap_error)?;
    let seq = build_uid_sequence(uids);
    let mut stream = session.uid_fetch(&seq, "(UID BODY.PEEK[])").await.map_err(imap_error)?;

    let mut out = Vec::new();
    while let Some(fetch) = stream.next().await {
        let fetch = fetch.map_err(imap_error)?;
        let Some(uid) = fetch.uid else { continue };
        let body = fetch.body().unwrap_or(&[]).to_vec();
        out.push((uid, body));
    }
    Ok(out)
}

/// Marks every uid in `uids` `\Deleted` in `folder` and expunges them.
async fn delete_uids(session: &mut ImapSession, folder: &str, uids: &[u32], copy_to_trash: bool) -> Result<(), RemoteError> {
    session.select(folder).await.map_err(imap_error)?;
    let seq = build_uid_sequence(uids);

    if copy_to_trash {
        session.uid_copy(&seq, "Trash").await.map_err(imap_error)?;
    }

    let mut store_stream = session
        .uid_store(&seq, "+FLAGS (\\Deleted)")
        .await
        .map_err(imap_error)?;
    while let Some(item) = store_stream.next().await {
        item.map_err(imap_error)?;
    }
    drop(store_stream);

    let mut expunge_stream = session.expunge().await.map_err(imap_error)?;
    while let Some(item) = expunge_stream.next().await {
        item.map_err(imap_error)?;
    }

    Ok(())
}

/// Groups composite remote ids by their folder, preserving first-seen order.
fn group_by_folder(ids: &[RemoteMessageId]) -> Result<Vec<(String, Vec<(u32, RemoteMessageId)>)>, RemoteError> {
    let mut groups: Vec<(String, Vec<(u32, RemoteMessageId)>)> = Vec::new();
    for id in ids {
        let (folder, uid) = parse_remote_id(id)?;
        match groups.iter_mut().find(|(f, _)| *f == folder) {
            Some((_, entries)) => entries.push((uid, id.clone())),
            None => groups.push((folder, vec![(uid, id.clone())])),
        }
    }
    Ok(groups)
}

/// Maximum uids fetched or deleted in a single IMAP command (§4.4).
const FETCH_CHUNK: usize = 50;

/// A generic mailbox-protocol mail source (IMAP), reached through a single
/// shared, lazily-connected session (§4.4 "Mailbox-protocol variant").
pub struct MailboxProviderAdapter {
    session: SessionHandle,
    limiter: Arc<RateLimiter>,
    page_size: u32,
    folders: AsyncMutex<Option<Vec<String>>>,
}

impl MailboxProviderAdapter {
    pub fn new(config: ImapConfig, limiter: Arc<RateLimiter>, page_size: u32) -> Self {
        Self {
            session: SessionHandle::new(config),
            limiter,
            page_size: page_size.max(1),
            folders: AsyncMutex::new(None),
        }
    }

    /// Returns the cached, sorted folder list, populating it from the
    /// server on first use (§4.4: "enumerates all selectable folders once
    /// per session").
    async fn folder_list(&self) -> Result<Vec<String>, RemoteError> {
        let mut cached = self.folders.lock().await;
        if let Some(folders) = cached.as_ref() {
            return Ok(folders.clone());
        }

        let folders = self
            .session
            .with_session(|session| async move {
                let mut stream = session.list(Some(""), Some("*")).await.map_err(imap_error)?;
                let mut names = Vec::new();
                while let Some(name) = stream.next().await {
                    let name = name.map_err(imap_error)?;
                    if name.attributes().iter().any(|a| matches!(a, NameAttribute::NoSelect)) {
                        continue;
                    }
                    names.push(name.name().to_string());
                }
                Ok(names)
            })
            .await?;

        let mut folders = folders;
        folders.sort();
        *cached = Some(folders.clone());
        Ok(folders)
    }
}

#[async_trait::async_trait]
impl RemoteAdapter for MailboxProviderAdapter {
    async fn profile(&self) -> Result<RemoteProfile, RemoteError> {
        self.limiter.acquire(1.0).await;
        self.session.with_session(|session| async move { session.noop().await.map_err(imap_error) }).await?;
        Ok(RemoteProfile {
            address: self.session.username().to_string(),
            display_name: None,
            history_position: None,
        })
    }

    async fn list_labels(&self) -> Result<Vec<RemoteLabel>, RemoteError> {
        self.limiter.acquire(1.0).await;
        self.folder_list()
            .await?
            .into_iter()
            .map(|name| {
                Ok(RemoteLabel {
                    id: RemoteLabelId::new(name.clone()).map_err(domain_err)?,
                    name,
                })
            })
            .collect()
    }

    async fn list_messages(&self, page_token: Option<&str>) -> Result<RemotePage<RemoteMessageSummary>, RemoteError> {
        let folders = self.folder_list().await?;
        let cursor = PageCursor::parse(page_token);
        if cursor.folder_index >= folders.len() {
            return Ok(RemotePage { items: Vec::new(), next_page_token: None });
        }

        let folder = folders[cursor.folder_index].clone();
        let page_size = self.page_size;
        self.limiter.acquire(5.0).await;

        let (fetched, exhausted) = self
            .session
            .with_session(|session| {
                let folder = folder.clone();
                async move { select_and_page(session, &folder, cursor.after_uid, page_size).await }
            })
            .await?;

        let next_page_token = if exhausted {
            let next_folder = cursor.folder_index + 1;
            (next_folder < folders.len()).then(|| PageCursor { folder_index: next_folder, after_uid: 0 }.encode())
        } else {
            let last_uid = fetched.last().map(|(uid, _)| *uid).unwrap_or(cursor.after_uid);
            Some(PageCursor { folder_index: cursor.folder_index, after_uid: last_uid }.encode())
        };

        Ok(RemotePage {
            items: fetched.into_iter().map(|(_, summary)| summary).collect(),
            next_page_token,
        })
    }

    async fn get_message_raw(&self, id: &RemoteMessageId) -> Result<Vec<u8>, RemoteError> {
        let (folder, uid) = parse_remote_id(id)?;
        self.limiter.acquire(5.0).await;
        let mut bodies = self
            .session
            .with_session(|session| {
                let folder = folder.clone();
                async move { fetch_raw_bodies(session, &folder, &[uid]).await }
            })
            .await?;
        bodies
            .pop()
            .map(|(_, bytes)| bytes)
            .ok_or_else(|| RemoteError::NotFound(id.to_string()))
    }

    async fn get_messages_raw_batch(&self, ids: &[RemoteMessageId]) -> Result<Vec<(RemoteMessageId, Vec<u8>)>, RemoteError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut results = Vec::new();
        for (folder, entries) in group_by_folder(ids)? {
            for chunk in entries.chunks(FETCH_CHUNK) {
                self.limiter.acquire(5.0).await;
                let uids: Vec<u32> = chunk.iter().map(|(uid, _)| *uid).collect();
                let folder = folder.clone();
                let fetched = self
                    .session
                    .with_session(|session| {
                        let folder = folder.clone();
                        let uids = uids.clone();
                        async move { fetch_raw_bodies(session, &folder, &uids).await }
                    })
                    .await;

                match fetched {
                    Ok(fetched) => {
                        let by_uid: HashMap<u32, Vec<u8>> = fetched.into_iter().collect();
                        for (uid, id) in chunk {
                            match by_uid.get(uid) {
                                Some(bytes) => results.push((id.clone(), bytes.clone())),
                                None => tracing::warn!(folder = %folder, uid, "message missing from batch fetch response"),
                            }
                        }
                    }
                    Err(err) => {
                        tracing::warn!(folder = %folder, error = %err, "batch fetch chunk failed, leaving slots empty");
                    }
                }
            }
        }

        Ok(results)
    }

    async fn list_history(&self, _since: Cursor, _page_token: Option<&str>) -> Result<HistoryPage, RemoteError> {
        Err(RemoteError::Other(
            "history is not supported for mailbox-protocol sources".to_string(),
        ))
    }

    async fn trash(&self, id: &RemoteMessageId) -> Result<(), RemoteError> {
        let (folder, uid) = parse_remote_id(id)?;
        self.limiter.acquire(5.0).await;
        self.session
            .with_session(|session| {
                let folder = folder.clone();
                async move { delete_uids(session, &folder, &[uid], true).await }
            })
            .await
    }

    async fn delete(&self, id: &RemoteMessageId) -> Result<(), RemoteError> {
        let (folder, uid) = parse_remote_id(id)?;
        self.limiter.acquire(10.0).await;
        self.session
            .with_session(|session| {
                let folder = folder.clone();
                async move { delete_uids(session, &folder, &[uid], false).await }
            })
            .await
    }

    async fn batch_delete(&self, ids: &[RemoteMessageId]) -> Result<Vec<(RemoteMessageId, RemoteError)>, RemoteError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut failed = Vec::new();
        for (folder, entries) in group_by_folder(ids)? {
            self.limiter.acquire(50.0).await;
            let uids: Vec<u32> = entries.iter().map(|(uid, _)| *uid).collect();
            let folder_for_call = folder.clone();
            let result = self
                .session
                .with_session(|session| {
                    let folder = folder_for_call.clone();
                    let uids = uids.clone();
                    async move { delete_uids(session, &folder, &uids, false).await }
                })
                .await;

            if let Err(err) = result {
                for (_, id) in &entries {
                    failed.push((id.clone(), RemoteError::Other(err.to_string())));
                }
            }
        }

        Ok(failed)
    }
}
