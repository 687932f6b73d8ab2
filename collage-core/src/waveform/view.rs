use crate::events::EventEmitter;
use crate::models::audio_models::SourceUrl;
use crate::models::error::CollageError;
use crate::traits::renderer::{RenderHandle, WaveformEvent, WaveformRenderer, WaveformSummary};

/// Visual, seekable rendering of one audio source at a time.
///
/// The view owns at most one [`RenderHandle`]. Loading a new source destroys
/// the previous handle before the renderer is asked for the next one.
pub struct WaveformView<R: WaveformRenderer> {
    renderer: R,
    handle: Option<R::Handle>,
    source: Option<SourceUrl>,
    summary: Option<WaveformSummary>,
    events: EventEmitter<WaveformEvent>,
    torn_down: bool,
}

impl<R: WaveformRenderer> WaveformView<R> {
    pub fn new(renderer: R) -> Self {
        Self {
            renderer,
            handle: None,
            source: None,
            summary: None,
            events: EventEmitter::new(),
            torn_down: false,
        }
    }

    pub fn events(&self) -> &EventEmitter<WaveformEvent> {
        &self.events
    }

    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    /// The bound source, if one is loaded and playable.
    pub fn source(&self) -> Option<&SourceUrl> {
        self.source.as_ref()
    }

    pub fn summary(&self) -> Option<&WaveformSummary> {
        self.summary.as_ref()
    }

    pub fn is_loaded(&self) -> bool {
        self.handle.is_some()
    }

    pub fn is_playing(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| h.is_playing())
    }

    pub fn position_secs(&self) -> f64 {
        self.handle.as_ref().map_or(0.0, |h| h.position_secs())
    }

    pub fn duration_secs(&self) -> f64 {
        self.handle.as_ref().map_or(0.0, |h| h.duration_secs())
    }

    /// Bind the view to `source` and wait for it to decode.
    ///
    /// On `Decode` failure the view is left with no handle.
    pub async fn load(&mut self, source: &SourceUrl) -> Result<WaveformSummary, CollageError> {
        if self.torn_down {
            return Err(CollageError::InvalidState("waveform view was torn down".into()));
        }
        self.release_handle();

        let mut handle = self.renderer.create(source, self.events.clone());
        match handle.ready().await {
            Ok(summary) => {
                log::debug!(
                    "waveform ready for {} ({:.2}s, {} bars)",
                    source,
                    summary.duration_secs,
                    summary.peaks.len()
                );
                self.handle = Some(handle);
                self.source = Some(source.clone());
                self.summary = Some(summary.clone());
                self.events.emit(&WaveformEvent::Ready(summary.clone()));
                Ok(summary)
            }
            Err(e) => {
                handle.destroy();
                let e = match e {
                    CollageError::Decode(_) => e,
                    other => CollageError::Decode(other.to_string()),
                };
                log::warn!("waveform load failed for {}: {}", source, e);
                self.events.emit(&WaveformEvent::DecodeFailed(e.to_string()));
                Err(e)
            }
        }
    }

    /// Play if paused, pause if playing. Does nothing without a loaded source.
    pub fn toggle_playback(&mut self) {
        let Some(handle) = self.handle.as_mut() else {
            return;
        };
        if handle.is_playing() {
            handle.pause();
            self.events.emit(&WaveformEvent::Pause);
        } else {
            handle.play();
            self.events.emit(&WaveformEvent::Play);
        }
    }

    /// Move the playhead to `ratio` of the duration, clamped to [0, 1].
    pub fn seek(&mut self, ratio: f64) {
        let Some(handle) = self.handle.as_mut() else {
            return;
        };
        let ratio = if ratio.is_nan() { 0.0 } else { ratio.clamp(0.0, 1.0) };
        handle.seek_to(ratio);
    }

    /// Destroy the handle and drop every listener. Later calls do nothing.
    pub fn teardown(&mut self) {
        if self.torn_down {
            return;
        }
        self.torn_down = true;
        self.release_handle();
        self.events.emit(&WaveformEvent::TornDown);
        self.events.clear();
    }

    fn release_handle(&mut self) {
        if let Some(mut handle) = self.handle.take() {
            handle.destroy();
        }
        self.source = None;
        self.summary = None;
    }
}

impl<R: WaveformRenderer> Drop for WaveformView<R> {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use parking_lot::Mutex;

    use super::*;
    use crate::testing::FakeRenderer;

    #[tokio::test]
    async fn second_load_destroys_first_handle() {
        let renderer = FakeRenderer::new(12.0);
        let tally = renderer.tally();
        let mut view = WaveformView::new(renderer);

        view.load(&SourceUrl::from("blob:one")).await.unwrap();
        view.load(&SourceUrl::from("blob:two")).await.unwrap();

        assert_eq!(tally.created(), 2);
        assert_eq!(tally.destroyed(), 1);
        assert_eq!(tally.live(), 1);
        assert_eq!(view.source().map(SourceUrl::as_str), Some("blob:two"));
    }

    #[tokio::test]
    async fn decode_failure_leaves_no_handle() {
        let renderer = FakeRenderer::new(5.0);
        let tally = renderer.tally();
        renderer.fail_source("blob:broken");
        let mut view = WaveformView::new(renderer);

        view.load(&SourceUrl::from("blob:good")).await.unwrap();
        let err = view.load(&SourceUrl::from("blob:broken")).await.unwrap_err();

        assert!(matches!(err, CollageError::Decode(_)));
        assert!(!view.is_loaded());
        assert_eq!(tally.live(), 0);

        // Transport calls quietly do nothing.
        view.toggle_playback();
        view.seek(0.5);
        assert!(!view.is_playing());
    }

    #[tokio::test]
    async fn toggle_and_seek_drive_the_handle() {
        let renderer = FakeRenderer::new(10.0);
        let mut view = WaveformView::new(renderer);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        view.events().subscribe(move |e| sink.lock().push(e.clone()));

        view.toggle_playback();
        assert!(seen.lock().is_empty());

        view.load(&SourceUrl::from("blob:a")).await.unwrap();
        view.toggle_playback();
        assert!(view.is_playing());
        view.toggle_playback();
        assert!(!view.is_playing());

        view.seek(1.7);
        assert_eq!(view.position_secs(), 10.0);
        view.seek(-0.2);
        assert_eq!(view.position_secs(), 0.0);
        view.seek(0.25);
        assert_eq!(view.position_secs(), 2.5);

        let events = seen.lock().clone();
        assert!(matches!(events[0], WaveformEvent::Ready(_)));
        assert_eq!(events[1..], [WaveformEvent::Play, WaveformEvent::Pause]);
    }

    #[tokio::test]
    async fn teardown_is_idempotent_and_blocks_reload() {
        let renderer = FakeRenderer::new(3.0);
        let tally = renderer.tally();
        let mut view = WaveformView::new(renderer);
        view.events().subscribe(|_| {});

        view.load(&SourceUrl::from("blob:a")).await.unwrap();
        view.teardown();
        view.teardown();

        assert_eq!(tally.destroyed(), 1);
        assert_eq!(tally.live(), 0);
        assert_eq!(view.events().listener_count(), 0);
        assert!(matches!(
            view.load(&SourceUrl::from("blob:b")).await,
            Err(CollageError::InvalidState(_))
        ));
    }

    #[tokio::test]
    async fn drop_destroys_live_handle() {
        let renderer = FakeRenderer::new(3.0);
        let tally = renderer.tally();
        {
            let mut view = WaveformView::new(renderer);
            view.load(&SourceUrl::from("blob:a")).await.unwrap();
        }
        assert_eq!(tally.live(), 0);
    }
}
