//! Home feed: the signed-in user's entries grouped by day.
//!
//! Exactly one live query runs at a time. Switching between "all entries"
//! and a single date aborts the running collector task and waits for it to
//! end before the next query is opened, so its subscription is gone and it
//! cannot publish a stale result afterwards.

use std::sync::Arc;

use chrono::{Duration, FixedOffset, NaiveDate, NaiveTime, TimeZone, Utc};
use futures::StreamExt;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use diary_shared::paths::owner_prefix;
use diary_shared::{group_by_day, DiaryFeed, DocumentError, RequestState};

use crate::error::{ClientError, Result};
use crate::reconciler::{ReconcileReport, Reconciler};
use crate::remote::{DocumentStore, EntryStream, NetworkStatus, ObjectStore};
use crate::session::Session;

pub struct HomeFeed {
    documents: Arc<dyn DocumentStore>,
    objects: Arc<dyn ObjectStore>,
    session: Session,
    reconciler: Reconciler,
    network: watch::Receiver<NetworkStatus>,
    image_prefix: String,
    utc_offset: FixedOffset,
    state: Arc<watch::Sender<DiaryFeed>>,
    selected_date: Option<NaiveDate>,
    query: Option<JoinHandle<()>>,
}

impl HomeFeed {
    pub fn new(
        documents: Arc<dyn DocumentStore>,
        objects: Arc<dyn ObjectStore>,
        session: Session,
        reconciler: Reconciler,
        network: watch::Receiver<NetworkStatus>,
        image_prefix: impl Into<String>,
        utc_offset: FixedOffset,
    ) -> Self {
        let (state, _) = watch::channel(RequestState::Idle);
        Self {
            documents,
            objects,
            session,
            reconciler,
            network,
            image_prefix: image_prefix.into(),
            utc_offset,
            state: Arc::new(state),
            selected_date: None,
            query: None,
        }
    }

    /// Observe the feed.
    pub fn subscribe(&self) -> watch::Receiver<DiaryFeed> {
        self.state.subscribe()
    }

    pub fn current(&self) -> DiaryFeed {
        self.state.borrow().clone()
    }

    pub fn date_is_selected(&self) -> bool {
        self.selected_date.is_some()
    }

    pub fn selected_date(&self) -> Option<NaiveDate> {
        self.selected_date
    }

    pub async fn show_all(&mut self) {
        self.switch(None).await;
    }

    pub async fn show_date(&mut self, date: NaiveDate) {
        self.switch(Some(date)).await;
    }

    async fn switch(&mut self, date: Option<NaiveDate>) {
        self.selected_date = date;
        self.stop().await;
        self.state.send_replace(RequestState::Loading);

        let Some(user) = self.session.current_user() else {
            self.state
                .send_replace(RequestState::Error(DocumentError::Unauthenticated));
            return;
        };

        let stream = match date {
            None => self.documents.query_all(&user.user_id),
            Some(day) => {
                let (start, end) = day_bounds(day, &self.utc_offset);
                self.documents
                    .query_by_date_range(&user.user_id, start, end)
            }
        };
        debug!(owner = %user.user_id, date = ?date, "feed query started");

        self.query = Some(tokio::spawn(collect(
            stream,
            self.state.clone(),
            self.utc_offset,
        )));
    }

    /// Cancel the running query and wait until it is gone.
    async fn stop(&mut self) {
        if let Some(task) = self.query.take() {
            task.abort();
            let _ = task.await;
        }
    }

    /// Delete every entry and image of the signed-in user.
    ///
    /// Needs connectivity up front. Image deletes are recorded before the
    /// documents go and are withdrawn if the documents could not be deleted.
    pub async fn delete_all(&mut self) -> Result<JoinHandle<ReconcileReport>> {
        if *self.network.borrow() != NetworkStatus::Available {
            return Err(ClientError::NoConnectivity);
        }
        let owner = self.session.require_owner()?;
        let prefix = owner_prefix(&self.image_prefix, &owner);

        let paths = self
            .objects
            .list(&prefix)
            .await
            .map_err(|e| ClientError::RemoteWrite(e.to_string()))?;

        let ledger = self.reconciler.ledger();
        let recorded = ledger.record_edit(Vec::new(), paths.clone()).await?;

        if let Err(e) = self.documents.delete_all_for_owner(&owner).await {
            if let Err(undo) = ledger.withdraw_edit(recorded).await {
                warn!(owner = %owner, error = %undo, "could not withdraw image deletes");
            }
            return Err(e.into());
        }

        if let Err(e) = ledger.abandon_uploads_with_prefix(&prefix).await {
            warn!(owner = %owner, error = %e, "could not drop pending uploads");
        }

        info!(owner = %owner, images = paths.len(), "all entries deleted");
        Ok(self.reconciler.trigger())
    }
}

impl Drop for HomeFeed {
    fn drop(&mut self) {
        if let Some(task) = self.query.take() {
            task.abort();
        }
    }
}

async fn collect(mut stream: EntryStream, state: Arc<watch::Sender<DiaryFeed>>, offset: FixedOffset) {
    while let Some(result) = stream.next().await {
        let next = match result {
            Ok(entries) => RequestState::Success(group_by_day(entries, &offset)),
            Err(e) => RequestState::Error(e),
        };
        state.send_replace(next);
    }
}

/// `[start, end)` in UTC of `day` as seen at `offset`.
fn day_bounds(
    day: NaiveDate,
    offset: &FixedOffset,
) -> (chrono::DateTime<Utc>, chrono::DateTime<Utc>) {
    let local_midnight = day.and_time(NaiveTime::MIN);
    let start = Utc.from_utc_datetime(
        &(local_midnight - Duration::seconds(i64::from(offset.local_minus_utc()))),
    );
    (start, start + Duration::days(1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::memory::{MemoryDocumentStore, MemoryObjectStore, StaticIdentity};
    use crate::ledger::Ledger;
    use diary_shared::{DayGroup, DiaryEntry, OwnerId};
    use diary_store::Database;

    struct Fixture {
        feed: HomeFeed,
        docs: Arc<MemoryDocumentStore>,
        objects: Arc<MemoryObjectStore>,
        ledger: Ledger,
        network: watch::Sender<NetworkStatus>,
    }

    fn fixture_with(identity: StaticIdentity) -> Fixture {
        let docs = Arc::new(MemoryDocumentStore::new());
        let objects = Arc::new(MemoryObjectStore::new());
        let ledger = Ledger::new(Database::open_in_memory().unwrap());
        let reconciler = Reconciler::new(ledger.clone(), objects.clone());
        let session = Session::new(Arc::new(identity), docs.clone());
        let (network, network_rx) = watch::channel(NetworkStatus::Available);
        let feed = HomeFeed::new(
            docs.clone(),
            objects.clone(),
            session,
            reconciler,
            network_rx,
            "images",
            FixedOffset::east_opt(0).unwrap(),
        );
        Fixture {
            feed,
            docs,
            objects,
            ledger,
            network,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(StaticIdentity::signed_in("u1"))
    }

    async fn add(docs: &MemoryDocumentStore, owner: &str, day: u32, hour: u32, title: &str) {
        let mut entry = DiaryEntry::new(
            &OwnerId(owner.into()),
            Utc.with_ymd_and_hms(2024, 6, day, hour, 0, 0).unwrap(),
        );
        entry.title = title.into();
        docs.upsert(entry).await.unwrap();
    }

    async fn wait_until(
        rx: &mut watch::Receiver<DiaryFeed>,
        ready: impl Fn(&[DayGroup]) -> bool,
    ) -> Vec<DayGroup> {
        tokio::time::timeout(std::time::Duration::from_secs(5), async {
            loop {
                if let Some(groups) = rx.borrow_and_update().success() {
                    if ready(groups.as_slice()) {
                        return groups.clone();
                    }
                }
                rx.changed().await.unwrap();
            }
        })
        .await
        .expect("feed should load")
    }

    async fn wait_for_success(rx: &mut watch::Receiver<DiaryFeed>) -> Vec<DayGroup> {
        wait_until(rx, |_| true).await
    }

    fn june(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, day).unwrap()
    }

    #[tokio::test]
    async fn test_show_all_groups_by_day() {
        let mut f = fixture();
        add(&f.docs, "u1", 1, 9, "morning").await;
        add(&f.docs, "u1", 1, 21, "evening").await;
        add(&f.docs, "u1", 2, 12, "next day").await;
        add(&f.docs, "u2", 2, 12, "someone else").await;

        let mut rx = f.feed.subscribe();
        f.feed.show_all().await;
        let groups = wait_for_success(&mut rx).await;

        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].date, june(2));
        assert_eq!(groups[1].date, june(1));
        assert_eq!(groups[1].entries[0].title, "evening");
        assert!(!f.feed.date_is_selected());
    }

    #[tokio::test]
    async fn test_switching_query_keeps_one_subscription() {
        let mut f = fixture();
        add(&f.docs, "u1", 1, 9, "first").await;
        add(&f.docs, "u1", 2, 9, "second").await;

        f.feed.show_all().await;
        assert_eq!(f.docs.active_subscriptions(), 1);

        f.feed.show_date(june(1)).await;
        assert_eq!(f.docs.active_subscriptions(), 1);
        assert!(f.feed.date_is_selected());

        let mut rx = f.feed.subscribe();
        let groups = wait_for_success(&mut rx).await;
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].date, june(1));

        // a change the old all-entries query would have reported
        add(&f.docs, "u1", 3, 9, "third").await;
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        let groups = f.feed.current().success().cloned().unwrap();
        assert!(groups.iter().all(|g| g.date == june(1)));
    }

    #[tokio::test]
    async fn test_feed_follows_remote_changes() {
        let mut f = fixture();
        let mut rx = f.feed.subscribe();
        f.feed.show_all().await;
        assert!(wait_for_success(&mut rx).await.is_empty());

        add(&f.docs, "u1", 5, 9, "new").await;
        let groups = wait_until(&mut rx, |g| !g.is_empty()).await;
        assert_eq!(groups[0].date, june(5));
    }

    #[tokio::test]
    async fn test_signed_out_feed_is_unauthenticated() {
        let mut f = fixture_with(StaticIdentity::new());
        f.feed.show_all().await;

        assert_eq!(
            f.feed.current(),
            RequestState::Error(DocumentError::Unauthenticated)
        );
        assert_eq!(f.docs.active_subscriptions(), 0);
    }

    #[test]
    fn test_day_bounds_follow_offset() {
        let offset = FixedOffset::east_opt(2 * 3600).unwrap();
        let (start, end) = day_bounds(june(1), &offset);
        assert_eq!(start, Utc.with_ymd_and_hms(2024, 5, 31, 22, 0, 0).unwrap());
        assert_eq!(end, Utc.with_ymd_and_hms(2024, 6, 1, 22, 0, 0).unwrap());
    }

    #[tokio::test]
    async fn test_delete_all_needs_connectivity() {
        let mut f = fixture();
        add(&f.docs, "u1", 1, 9, "keep me").await;
        f.network.send_replace(NetworkStatus::Lost);

        let err = f.feed.delete_all().await.unwrap_err();
        assert!(matches!(err, ClientError::NoConnectivity));
        assert_eq!(err.to_string(), "No Internet Connection");
        assert_eq!(f.docs.len(), 1);
    }

    #[tokio::test]
    async fn test_delete_all_enqueues_image_deletes() {
        let mut f = fixture();
        add(&f.docs, "u1", 1, 9, "mine").await;
        add(&f.docs, "u2", 1, 9, "theirs").await;
        f.objects.insert("images/u1/a.jpg", "content://a");
        f.objects.insert("images/u1/b.jpg", "content://b");
        f.objects.insert("images/u2/c.jpg", "content://c");
        f.ledger
            .enqueue_upload("images/u1/pending.jpg", "content://p")
            .await
            .unwrap();
        // keep the rows around for inspection
        f.objects.fail_path("images/u1/a.jpg");
        f.objects.fail_path("images/u1/b.jpg");

        let report = f.feed.delete_all().await.unwrap().await.unwrap();
        assert_eq!(report.deletes_failed, 2);

        let deletes: Vec<_> = f
            .ledger
            .list_deletes()
            .await
            .unwrap()
            .into_iter()
            .map(|d| d.remote_path)
            .collect();
        assert_eq!(deletes, ["images/u1/a.jpg", "images/u1/b.jpg"]);
        assert!(f.ledger.list_uploads().await.unwrap().is_empty());
        assert_eq!(f.docs.len(), 1);
        assert!(f.objects.contains("images/u2/c.jpg"));
    }

    #[tokio::test]
    async fn test_failed_delete_all_withdraws_rows() {
        let mut f = fixture();
        add(&f.docs, "u1", 1, 9, "mine").await;
        f.objects.insert("images/u1/a.jpg", "content://a");
        f.docs.set_online(false);

        let err = f.feed.delete_all().await.unwrap_err();
        assert!(matches!(err, ClientError::RemoteWrite(_)));
        assert!(f.ledger.counts().await.unwrap().is_empty());
        assert!(f.objects.contains("images/u1/a.jpg"));
    }

    #[tokio::test]
    async fn test_rejected_delete_all_keeps_store_reason() {
        let mut f = fixture();
        add(&f.docs, "u1", 1, 9, "mine").await;
        f.objects.insert("images/u1/a.jpg", "content://a");
        f.docs.reject_writes(true);

        let err = f.feed.delete_all().await.unwrap_err();
        assert_eq!(err.to_string(), "Remote write failed: write rejected by store");
        assert!(f.ledger.counts().await.unwrap().is_empty());
        assert_eq!(f.docs.len(), 1);
    }
}
