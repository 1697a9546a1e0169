//! Retrieval pipeline: fetch every message, keep the ones addressed to an alias.

use std::sync::Arc;

use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use super::extractor::extract;
use super::matcher::RecipientMatcher;
use super::normalizer::normalize;
use super::types::{MessageSummary, ResultMessage};
use crate::config::MailAccount;
use crate::error::{MailboxError, ParseError};
use crate::mailbox::{MailboxAccess, MailboxSession, RawMessage};

/// What happened to one message.
#[derive(Debug)]
enum Outcome {
    Matched(ResultMessage),
    Unmatched,
    Failed(ParseError),
}

/// Normalizer → Matcher → Extractor over a whole mailbox.
pub struct RetrievalPipeline {
    mailbox: Arc<dyn MailboxAccess>,
    matcher: Arc<RecipientMatcher>,
}

impl RetrievalPipeline {
    pub fn new(mailbox: Arc<dyn MailboxAccess>) -> Self {
        Self::with_matcher(mailbox, RecipientMatcher::default())
    }

    pub fn with_matcher(mailbox: Arc<dyn MailboxAccess>, matcher: RecipientMatcher) -> Self {
        Self {
            mailbox,
            matcher: Arc::new(matcher),
        }
    }

    /// Messages addressed to `alias`, newest first.
    ///
    /// Any transport failure fails the whole call; undecodable messages are
    /// logged and dropped.
    pub async fn retrieve(
        &self,
        alias: &str,
        account: &MailAccount,
    ) -> Result<Vec<ResultMessage>, MailboxError> {
        let mut session = self.mailbox.open(account).await?;

        let alias_lower: Arc<str> = Arc::from(alias.to_lowercase());
        let matcher = Arc::clone(&self.matcher);
        let outcomes = fetch_each(session.as_mut(), move |raw| {
            classify(&raw, &alias_lower, &matcher)
        })
        .await;
        session.close().await;

        let mut messages = Vec::new();
        let (mut unmatched, mut failed) = (0usize, 0usize);
        for outcome in outcomes? {
            match outcome {
                Some(Outcome::Matched(msg)) => messages.push(msg),
                Some(Outcome::Unmatched) => unmatched += 1,
                Some(Outcome::Failed(e)) => {
                    if !matches!(e, ParseError::MissingHeader { .. }) {
                        warn!(error = %e, "Skipping message");
                        failed += 1;
                    }
                }
                None => failed += 1,
            }
        }

        messages.sort_by(|a, b| b.date.cmp(&a.date));

        info!(
            alias = %alias,
            matched = messages.len(),
            unmatched,
            failed,
            "Mailbox check complete"
        );
        Ok(messages)
    }

    /// Every message in the mailbox, unfiltered, by sequence number.
    pub async fn list_all(&self, account: &MailAccount) -> Result<Vec<MessageSummary>, MailboxError> {
        let mut session = self.mailbox.open(account).await?;
        let outcomes = fetch_each(session.as_mut(), |raw| {
            normalize(&raw).map(|msg| MessageSummary::from(&msg))
        })
        .await;
        session.close().await;

        let mut summaries: Vec<MessageSummary> = outcomes?
            .into_iter()
            .flatten()
            .filter_map(|res| match res {
                Ok(summary) => Some(summary),
                Err(e) => {
                    warn!(error = %e, "Skipping message");
                    None
                }
            })
            .collect();
        summaries.sort_by_key(|s| s.seq);

        info!(mailbox = %account.id, total = summaries.len(), "Listed mailbox");
        Ok(summaries)
    }
}

fn classify(raw: &RawMessage, alias: &str, matcher: &RecipientMatcher) -> Outcome {
    let msg = match normalize(raw) {
        Ok(msg) => msg,
        Err(e) => return Outcome::Failed(e),
    };

    match matcher.matched_by(&msg, alias) {
        Some(strategy) => {
            debug!(seq = msg.seq, strategy, subject = %msg.subject, "Found message for alias");
            Outcome::Matched(extract(&msg))
        }
        None => Outcome::Unmatched,
    }
}

/// Fetch every message over one session, processing each on its own blocking
/// task. Returns once all tasks finished; `None` marks a task that panicked.
///
/// A fetch failure aborts outstanding tasks and fails the call.
async fn fetch_each<T, F>(
    session: &mut dyn MailboxSession,
    work: F,
) -> Result<Vec<Option<T>>, MailboxError>
where
    T: Send + 'static,
    F: Fn(RawMessage) -> T + Clone + Send + 'static,
{
    let ids = session.list_ids().await?;
    if ids.is_empty() {
        debug!("Mailbox is empty");
        return Ok(Vec::new());
    }
    debug!(total = ids.len(), "Fetching messages");

    let mut tasks = JoinSet::new();
    for seq in ids {
        let raw = match session.fetch(seq).await {
            Ok(raw) => raw,
            Err(e) => {
                error!(seq, error = %e, "Message fetch failed");
                tasks.abort_all();
                return Err(e);
            }
        };
        let work = work.clone();
        tasks.spawn_blocking(move || work(raw));
    }

    let mut results = Vec::with_capacity(tasks.len());
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(value) => results.push(Some(value)),
            Err(e) => {
                error!(error = %e, "Message task failed");
                results.push(None);
            }
        }
    }
    Ok(results)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use secrecy::SecretString;

    use super::*;

    /// Scripted in-memory mailbox.
    #[derive(Default)]
    struct FakeMailbox {
        messages: Vec<RawMessage>,
        fail_fetch_at: Option<u32>,
        fail_open: bool,
        closed: Arc<Mutex<u32>>,
    }

    struct FakeSession {
        messages: HashMap<u32, RawMessage>,
        order: Vec<u32>,
        fail_fetch_at: Option<u32>,
        closed: Arc<Mutex<u32>>,
    }

    #[async_trait]
    impl MailboxAccess for FakeMailbox {
        async fn open(
            &self,
            _account: &MailAccount,
        ) -> Result<Box<dyn MailboxSession>, MailboxError> {
            if self.fail_open {
                return Err(MailboxError::Protocol("refused".into()));
            }
            Ok(Box::new(FakeSession {
                messages: self.messages.iter().map(|m| (m.seq, m.clone())).collect(),
                order: self.messages.iter().map(|m| m.seq).collect(),
                fail_fetch_at: self.fail_fetch_at,
                closed: Arc::clone(&self.closed),
            }))
        }
    }

    #[async_trait]
    impl MailboxSession for FakeSession {
        async fn list_ids(&mut self) -> Result<Vec<u32>, MailboxError> {
            Ok(self.order.clone())
        }

        async fn fetch(&mut self, seq: u32) -> Result<RawMessage, MailboxError> {
            if self.fail_fetch_at == Some(seq) {
                return Err(MailboxError::Protocol("stream reset".into()));
            }
            self.messages.get(&seq).cloned().ok_or(MailboxError::Closed)
        }

        async fn close(self: Box<Self>) {
            *self.closed.lock().unwrap() += 1;
        }
    }

    fn account() -> MailAccount {
        MailAccount {
            id: "primary".into(),
            user: "inbox@example.com".into(),
            password: SecretString::from("pw"),
            host: "imap.example.com".into(),
            imap_port: 993,
            domain: "example.com".into(),
        }
    }

    fn raw(seq: u32, to: &str, subject: &str, date: &str) -> RawMessage {
        RawMessage {
            seq,
            header: format!(
                "From: sender@example.org\r\nTo: {to}\r\nSubject: {subject}\r\nDate: {date}\r\n\r\n"
            ),
            body: format!("body of {subject}\r\n"),
        }
    }

    #[tokio::test]
    async fn returns_only_matching_newest_first() {
        let mailbox = FakeMailbox {
            messages: vec![
                raw(1, "bob@example.com", "old", "Mon, 02 Feb 2026 10:00:00 +0000"),
                raw(2, "alice@example.com", "other", "Tue, 03 Feb 2026 10:00:00 +0000"),
                raw(3, "\"Bob\" <BOB@example.com>", "new", "Wed, 04 Feb 2026 10:00:00 +0000"),
            ],
            ..Default::default()
        };
        let closed = Arc::clone(&mailbox.closed);
        let pipeline = RetrievalPipeline::new(Arc::new(mailbox));

        let msgs = pipeline.retrieve("bob@example.com", &account()).await.unwrap();

        let subjects: Vec<_> = msgs.iter().map(|m| m.subject.as_str()).collect();
        assert_eq!(subjects, vec!["new", "old"]);
        assert_eq!(msgs[1].text, "body of old");
        assert_eq!(*closed.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn cc_recipients_match() {
        let mut msg = raw(1, "alice@example.com", "cc'd", "Mon, 02 Feb 2026 10:00:00 +0000");
        msg.header = msg
            .header
            .replace("Subject:", "Cc: bob@example.com\r\nSubject:");
        let pipeline = RetrievalPipeline::new(Arc::new(FakeMailbox {
            messages: vec![msg],
            ..Default::default()
        }));

        let msgs = pipeline.retrieve("bob@example.com", &account()).await.unwrap();
        assert_eq!(msgs.len(), 1);
    }

    #[tokio::test]
    async fn headerless_message_is_skipped() {
        let pipeline = RetrievalPipeline::new(Arc::new(FakeMailbox {
            messages: vec![
                RawMessage {
                    seq: 1,
                    header: String::new(),
                    body: "orphan".into(),
                },
                raw(2, "bob@example.com", "kept", "Mon, 02 Feb 2026 10:00:00 +0000"),
            ],
            ..Default::default()
        }));

        let msgs = pipeline.retrieve("bob@example.com", &account()).await.unwrap();
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0].subject, "kept");
    }

    #[tokio::test]
    async fn fetch_failure_fails_whole_call() {
        let mailbox = FakeMailbox {
            messages: vec![
                raw(1, "bob@example.com", "a", "Mon, 02 Feb 2026 10:00:00 +0000"),
                raw(2, "bob@example.com", "b", "Mon, 02 Feb 2026 11:00:00 +0000"),
            ],
            fail_fetch_at: Some(2),
            ..Default::default()
        };
        let closed = Arc::clone(&mailbox.closed);
        let pipeline = RetrievalPipeline::new(Arc::new(mailbox));

        let err = pipeline.retrieve("bob@example.com", &account()).await.unwrap_err();
        assert!(matches!(err, MailboxError::Protocol(_)));
        assert_eq!(*closed.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn open_failure_is_upstream_error() {
        let pipeline = RetrievalPipeline::new(Arc::new(FakeMailbox {
            fail_open: true,
            ..Default::default()
        }));
        assert!(pipeline.retrieve("bob@example.com", &account()).await.is_err());
    }

    #[tokio::test]
    async fn empty_mailbox_is_empty_result() {
        let pipeline = RetrievalPipeline::new(Arc::new(FakeMailbox::default()));
        let msgs = pipeline.retrieve("bob@example.com", &account()).await.unwrap();
        assert!(msgs.is_empty());
    }

    #[tokio::test]
    async fn list_all_is_unfiltered_and_ordered() {
        let pipeline = RetrievalPipeline::new(Arc::new(FakeMailbox {
            messages: vec![
                raw(5, "alice@example.com", "five", "Mon, 02 Feb 2026 10:00:00 +0000"),
                raw(2, "bob@example.com", "two", "Mon, 02 Feb 2026 09:00:00 +0000"),
            ],
            ..Default::default()
        }));

        let all = pipeline.list_all(&account()).await.unwrap();
        let seqs: Vec<_> = all.iter().map(|s| s.seq).collect();
        assert_eq!(seqs, vec![2, 5]);
        assert_eq!(all[1].to, vec!["alice@example.com"]);
    }
}
