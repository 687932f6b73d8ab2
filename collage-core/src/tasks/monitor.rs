use std::sync::Arc;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::events::EventEmitter;
use crate::models::audio_models::SourceUrl;
use crate::models::config::MonitorConfig;
use crate::models::error::CollageError;
use crate::models::task::{ProcessingTask, TaskId, TaskStatus};
use crate::traits::services::{CollectionService, ProcessingService};

/// Notifications published by a [`TaskMonitor`].
#[derive(Debug, Clone, PartialEq)]
pub enum MonitorEvent {
    /// A status answer was applied.
    Updated(ProcessingTask),
    /// The task reached `Completed` or `Failed`; polling has ended.
    Finished(ProcessingTask),
    /// Polling halted on a transport error. The task itself is unchanged.
    Interrupted(CollageError),
}

struct MonitorState {
    task: Option<ProcessingTask>,
    polls: u32,
    poller: Option<JoinHandle<()>>,
    starting: bool,
    last_error: Option<CollageError>,
    /// Bumped whenever polling is (re)started or cancelled; answers carrying an
    /// older value are dropped.
    generation: u64,
}

impl MonitorState {
    fn cancel_polling(&mut self) {
        self.generation += 1;
        if let Some(poller) = self.poller.take() {
            poller.abort();
        }
    }
}

/// Starts server-side processing of a collection and follows it to a terminal state.
///
/// One status request is issued immediately and then once per
/// `poll_interval`. Polling ends on the first terminal answer, after
/// `max_polls` requests without one (`Timeout`), on a transport error, or when
/// the monitor is stopped.
pub struct TaskMonitor<C: CollectionService, P: ProcessingService> {
    collections: Arc<C>,
    processing: Arc<P>,
    config: MonitorConfig,
    shared: Arc<Mutex<MonitorState>>,
    events: EventEmitter<MonitorEvent>,
}

impl<C, P> TaskMonitor<C, P>
where
    C: CollectionService + 'static,
    P: ProcessingService + 'static,
{
    pub fn new(collections: Arc<C>, processing: Arc<P>, config: MonitorConfig) -> Result<Self, CollageError> {
        config.validate()?;
        Ok(Self {
            collections,
            processing,
            config,
            shared: Arc::new(Mutex::new(MonitorState {
                task: None,
                polls: 0,
                poller: None,
                starting: false,
                last_error: None,
                generation: 0,
            })),
            events: EventEmitter::new(),
        })
    }

    pub fn events(&self) -> &EventEmitter<MonitorEvent> {
        &self.events
    }

    /// Snapshot of the monitored task.
    pub fn task(&self) -> Option<ProcessingTask> {
        self.shared.lock().task.clone()
    }

    pub fn is_polling(&self) -> bool {
        self.shared.lock().poller.is_some()
    }

    /// Status requests issued for the current task.
    pub fn polls_issued(&self) -> u32 {
        self.shared.lock().polls
    }

    /// The transport error that interrupted polling, if any.
    pub fn last_error(&self) -> Option<CollageError> {
        self.shared.lock().last_error.clone()
    }

    /// Artifact location once the task has completed.
    pub fn artifact(&self) -> Option<SourceUrl> {
        self.shared
            .lock()
            .task
            .as_ref()
            .and_then(|t| t.artifact.clone())
    }

    /// Begin processing `collection_id` and start polling.
    ///
    /// Fails with `EmptyCollection` before asking the service to process if
    /// the collection has no contributions. A `stop()` or `teardown()` issued
    /// while the request is in flight wins: no polling starts.
    pub async fn start(&self, collection_id: &str) -> Result<ProcessingTask, CollageError> {
        let generation = {
            let mut s = self.shared.lock();
            if s.starting || s.poller.is_some() {
                return Err(CollageError::InvalidState(
                    "a processing task is already being monitored".into(),
                ));
            }
            s.starting = true;
            s.generation
        };

        let result = self.submit(collection_id).await;

        let mut s = self.shared.lock();
        s.starting = false;
        if s.generation != generation {
            if let Ok(task_id) = &result {
                log::warn!("processing task {} started after the monitor was stopped", task_id);
            }
            return Err(CollageError::InvalidState(
                "monitor was stopped while starting".into(),
            ));
        }
        let task_id = result?;
        let task = ProcessingTask::queued(task_id, collection_id);
        log::info!("processing task {} queued for {}", task.task_id, collection_id);
        s.task = Some(task.clone());
        s.polls = 0;
        s.last_error = None;
        self.spawn_poller(&mut s);
        Ok(task)
    }

    async fn submit(&self, collection_id: &str) -> Result<TaskId, CollageError> {
        let collection = self.collections.fetch_collection(collection_id).await?;
        if collection.is_empty() {
            return Err(CollageError::EmptyCollection(collection_id.to_string()));
        }
        self.processing.start_processing(collection_id).await
    }

    /// Restart polling after a transport error or an explicit `stop()`.
    pub fn resume(&self) -> Result<(), CollageError> {
        let mut s = self.shared.lock();
        if s.poller.is_some() {
            return Ok(());
        }
        match &s.task {
            None => return Err(CollageError::InvalidState("no task to resume".into())),
            Some(task) if task.is_terminal() => {
                return Err(CollageError::InvalidState(format!(
                    "task {} already finished",
                    task.task_id
                )))
            }
            Some(_) => {}
        }
        s.last_error = None;
        self.spawn_poller(&mut s);
        Ok(())
    }

    /// Halt polling immediately. Any answer still in flight is discarded.
    pub fn stop(&self) {
        let mut s = self.shared.lock();
        if s.poller.is_some() {
            log::debug!("polling cancelled");
        }
        s.cancel_polling();
    }

    /// Stop polling and ask the service to revoke the task.
    pub async fn abort(&self) -> Result<(), CollageError> {
        let task_id = {
            let mut s = self.shared.lock();
            s.cancel_polling();
            match &s.task {
                Some(task) if !task.is_terminal() => task.task_id.clone(),
                _ => return Err(CollageError::InvalidState("no running task to abort".into())),
            }
        };

        self.processing.cancel_task(&task_id).await?;

        let finished = {
            let mut s = self.shared.lock();
            match s.task.as_mut() {
                Some(task) if task.task_id == task_id && !task.is_terminal() => {
                    task.fail(CollageError::Processing("task was cancelled".into()));
                    Some(task.clone())
                }
                _ => None,
            }
        };
        if let Some(task) = finished {
            log::info!("processing task {} cancelled", task.task_id);
            self.events.emit(&MonitorEvent::Finished(task));
        }
        Ok(())
    }

    /// Download the combined artifact of a completed task.
    pub async fn fetch_artifact(&self) -> Result<Vec<u8>, CollageError> {
        let collection_id = {
            let s = self.shared.lock();
            match &s.task {
                Some(task) if task.status == TaskStatus::Completed => task.collection_id.clone(),
                _ => {
                    return Err(CollageError::InvalidState(
                        "artifact is available only after processing completes".into(),
                    ))
                }
            }
        };
        self.processing.fetch_artifact(&collection_id).await
    }

    /// Stop polling and drop every listener.
    pub fn teardown(&self) {
        self.stop();
        self.events.clear();
    }

    fn spawn_poller(&self, s: &mut MonitorState) {
        s.cancel_polling();
        let poller = Poller {
            processing: Arc::clone(&self.processing),
            shared: Arc::clone(&self.shared),
            events: self.events.clone(),
            config: self.config.clone(),
            generation: s.generation,
        };
        s.poller = Some(tokio::spawn(poller.run()));
    }
}

impl<C: CollectionService, P: ProcessingService> Drop for TaskMonitor<C, P> {
    fn drop(&mut self) {
        self.shared.lock().cancel_polling();
    }
}

struct Poller<P: ProcessingService> {
    processing: Arc<P>,
    shared: Arc<Mutex<MonitorState>>,
    events: EventEmitter<MonitorEvent>,
    config: MonitorConfig,
    generation: u64,
}

impl<P: ProcessingService> Poller<P> {
    async fn run(self) {
        let mut ticker = tokio::time::interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;

            let task_id = {
                let mut s = self.shared.lock();
                if s.generation != self.generation {
                    return;
                }
                let Some(task) = s.task.as_ref() else {
                    s.poller = None;
                    return;
                };
                let task_id = task.task_id.clone();
                s.polls += 1;
                task_id
            };

            let answer = self.processing.task_status(&task_id).await;

            let event = {
                let mut s = self.shared.lock();
                if s.generation != self.generation {
                    log::warn!("discarding status of {} received after cancellation", task_id);
                    return;
                }
                let polls = s.polls;
                let max_polls = self.config.max_polls;
                let Some(task) = s.task.as_mut() else {
                    s.poller = None;
                    return;
                };

                match answer {
                    Err(e) => {
                        log::warn!("status request for {} failed: {}", task_id, e);
                        s.last_error = Some(e.clone());
                        s.poller = None;
                        MonitorEvent::Interrupted(e)
                    }
                    Ok(report) => {
                        let status = report.status;
                        if !task.apply(report) {
                            log::debug!("ignoring {:?} for {} in {:?}", status, task_id, task.status);
                        }
                        if task.status == TaskStatus::Completed {
                            task.artifact = Some(self.processing.artifact_url(&task.collection_id));
                        } else if !task.is_terminal() && polls >= max_polls {
                            task.fail(CollageError::Timeout { attempts: polls });
                        }

                        if task.is_terminal() {
                            let task = task.clone();
                            s.poller = None;
                            log::info!("processing task {} finished as {:?}", task.task_id, task.status);
                            MonitorEvent::Finished(task)
                        } else {
                            MonitorEvent::Updated(task.clone())
                        }
                    }
                }
            };

            let done = !matches!(event, MonitorEvent::Updated(_));
            self.events.emit(&event);
            if done {
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::models::task::StatusReport;
    use crate::testing::{FakeCollections, FakeProcessing};

    fn monitor(
        processing: &Arc<FakeProcessing>,
        max_polls: u32,
    ) -> TaskMonitor<FakeCollections, FakeProcessing> {
        let collections = Arc::new(FakeCollections::with_messages("pod-1", 3));
        let config = MonitorConfig {
            max_polls,
            ..Default::default()
        };
        TaskMonitor::new(collections, Arc::clone(processing), config).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn polls_every_interval_until_completed() {
        let processing = Arc::new(FakeProcessing::scripted(vec![
            Ok(StatusReport::new(TaskStatus::Queued)),
            Ok(StatusReport::new(TaskStatus::Running).with_stage("mixing").with_progress(2, 3)),
            Ok(StatusReport::new(TaskStatus::Completed).with_stage("done")),
        ]));
        let mon = monitor(&processing, 150);

        let task = mon.start("pod-1").await.unwrap();
        assert_eq!(task.status, TaskStatus::Queued);

        tokio::time::sleep(Duration::from_secs(20)).await;

        let task = mon.task().unwrap();
        assert_eq!(task.status, TaskStatus::Completed);
        assert_eq!(task.history.len(), 3);
        assert_eq!(task.stage_history(), vec![None, Some("mixing"), Some("done")]);
        assert_eq!(task.progress.map(|p| (p.current, p.total)), Some((2, 3)));
        assert!(mon.artifact().is_some());
        assert!(!mon.is_polling());

        assert_eq!(processing.poll_count(), 3);
        let offsets = processing.poll_offsets();
        assert_eq!(
            offsets,
            vec![Duration::ZERO, Duration::from_secs(2), Duration::from_secs(4)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn failed_first_answer_stops_after_one_poll() {
        let processing = Arc::new(FakeProcessing::scripted(vec![Ok(
            StatusReport::new(TaskStatus::Failed).with_error("ffmpeg exited"),
        )]));
        let mon = monitor(&processing, 150);

        mon.start("pod-1").await.unwrap();
        tokio::time::sleep(Duration::from_secs(10)).await;

        let task = mon.task().unwrap();
        assert_eq!(task.status, TaskStatus::Failed);
        assert_eq!(task.error, Some(CollageError::Processing("ffmpeg exited".into())));
        assert_eq!(processing.poll_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn empty_collection_is_rejected_before_processing() {
        let processing = Arc::new(FakeProcessing::scripted(Vec::new()));
        let collections = Arc::new(FakeCollections::with_messages("pod-1", 0));
        let mon = TaskMonitor::new(collections, Arc::clone(&processing), MonitorConfig::default()).unwrap();

        let err = mon.start("pod-1").await.unwrap_err();
        assert!(matches!(err, CollageError::EmptyCollection(_)));
        assert_eq!(processing.start_count(), 0);
        assert!(mon.task().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn bounded_polls_end_in_timeout() {
        let processing = Arc::new(FakeProcessing::scripted(vec![Ok(StatusReport::new(
            TaskStatus::Running,
        ))]));
        let mon = monitor(&processing, 3);

        mon.start("pod-1").await.unwrap();
        tokio::time::sleep(Duration::from_secs(60)).await;

        let task = mon.task().unwrap();
        assert_eq!(task.status, TaskStatus::Failed);
        assert_eq!(task.error, Some(CollageError::Timeout { attempts: 3 }));
        assert_eq!(processing.poll_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn answer_after_stop_is_discarded() {
        let processing = Arc::new(
            FakeProcessing::scripted(vec![Ok(StatusReport::new(TaskStatus::Completed))])
                .with_delay(Duration::from_millis(500)),
        );
        let mon = monitor(&processing, 150);

        mon.start("pod-1").await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(processing.poll_count(), 1);
        mon.stop();

        tokio::time::sleep(Duration::from_secs(10)).await;
        let task = mon.task().unwrap();
        assert_eq!(task.status, TaskStatus::Queued);
        assert!(task.history.is_empty());
        assert_eq!(processing.poll_count(), 1);
        assert!(!mon.is_polling());
    }

    #[tokio::test(start_paused = true)]
    async fn teardown_during_start_prevents_polling() {
        let processing = Arc::new(FakeProcessing::scripted(vec![Ok(StatusReport::new(
            TaskStatus::Running,
        ))]));
        let collections =
            Arc::new(FakeCollections::with_messages("pod-1", 3).with_delay(Duration::from_millis(500)));
        let mon = Arc::new(
            TaskMonitor::new(collections, Arc::clone(&processing), MonitorConfig::default()).unwrap(),
        );

        let starting = Arc::clone(&mon);
        let start = tokio::spawn(async move { starting.start("pod-1").await });
        tokio::time::sleep(Duration::from_millis(100)).await;
        mon.teardown();

        let result = start.await.unwrap();
        assert!(matches!(result, Err(CollageError::InvalidState(_))));
        tokio::time::sleep(Duration::from_secs(20)).await;
        assert_eq!(processing.poll_count(), 0);
        assert!(!mon.is_polling());
        assert!(mon.task().is_none());

        // The monitor can still be started afterwards.
        mon.start("pod-1").await.unwrap();
        assert!(mon.is_polling());
    }

    #[tokio::test(start_paused = true)]
    async fn network_error_halts_until_resumed() {
        let processing = Arc::new(FakeProcessing::scripted(vec![
            Ok(StatusReport::new(TaskStatus::Running)),
            Err(CollageError::Network("timed out".into())),
            Ok(StatusReport::new(TaskStatus::Completed)),
        ]));
        let mon = monitor(&processing, 150);
        let interrupted = Arc::new(Mutex::new(0));
        let count = Arc::clone(&interrupted);
        mon.events().subscribe(move |e| {
            if matches!(e, MonitorEvent::Interrupted(_)) {
                *count.lock() += 1;
            }
        });

        mon.start("pod-1").await.unwrap();
        tokio::time::sleep(Duration::from_secs(10)).await;

        assert_eq!(processing.poll_count(), 2);
        assert_eq!(mon.task().unwrap().status, TaskStatus::Running);
        assert!(mon.last_error().is_some_and(|e| e.is_retryable()));
        assert_eq!(*interrupted.lock(), 1);

        mon.resume().unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(mon.task().unwrap().status, TaskStatus::Completed);
        assert_eq!(processing.poll_count(), 3);
        assert!(mon.resume().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn abort_cancels_remote_task() {
        let processing = Arc::new(FakeProcessing::scripted(vec![Ok(StatusReport::new(
            TaskStatus::Running,
        ))]));
        let mon = monitor(&processing, 150);

        mon.start("pod-1").await.unwrap();
        tokio::time::sleep(Duration::from_secs(3)).await;
        let polls = processing.poll_count();

        mon.abort().await.unwrap();
        tokio::time::sleep(Duration::from_secs(10)).await;

        assert_eq!(processing.cancel_count(), 1);
        assert_eq!(processing.poll_count(), polls);
        let task = mon.task().unwrap();
        assert_eq!(task.status, TaskStatus::Failed);
        assert!(mon.abort().await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn regressions_are_not_recorded() {
        let processing = Arc::new(FakeProcessing::scripted(vec![
            Ok(StatusReport::new(TaskStatus::Running)),
            Ok(StatusReport::new(TaskStatus::Queued)),
            Ok(StatusReport::new(TaskStatus::Completed)),
        ]));
        let mon = monitor(&processing, 150);

        mon.start("pod-1").await.unwrap();
        tokio::time::sleep(Duration::from_secs(10)).await;

        let task = mon.task().unwrap();
        assert_eq!(task.status, TaskStatus::Completed);
        assert_eq!(task.history.len(), 2);
        assert_eq!(processing.poll_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn second_start_while_polling_is_rejected() {
        let processing = Arc::new(FakeProcessing::scripted(vec![Ok(StatusReport::new(
            TaskStatus::Running,
        ))]));
        let mon = monitor(&processing, 150);

        mon.start("pod-1").await.unwrap();
        assert!(matches!(mon.start("pod-1").await, Err(CollageError::InvalidState(_))));
        assert_eq!(processing.start_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn artifact_download_requires_completion() {
        let processing = Arc::new(FakeProcessing::scripted(vec![Ok(StatusReport::new(
            TaskStatus::Completed,
        ))]));
        let mon = monitor(&processing, 150);

        assert!(mon.fetch_artifact().await.is_err());
        mon.start("pod-1").await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(mon.fetch_artifact().await.unwrap(), b"collage".to_vec());
    }
}
