use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::events::EventEmitter;
use crate::models::audio_models::SourceUrl;
use crate::models::config::WaveformConfig;
use crate::models::error::CollageError;
use crate::processing::{levels, wav_format};
use crate::storage::object_urls::ObjectUrls;
use crate::traits::renderer::{RenderHandle, WaveformEvent, WaveformRenderer, WaveformSummary};
use crate::traits::services::SourceFetcher;

/// Renders PCM WAV sources as normalized RMS bars and plays them against a
/// simulated clock.
///
/// `blob:` URLs resolve through the shared [`ObjectUrls`] registry; anything
/// else goes through the optional [`SourceFetcher`].
#[derive(Clone)]
pub struct PeakRenderer {
    urls: ObjectUrls,
    fetcher: Option<Arc<dyn SourceFetcher>>,
    config: WaveformConfig,
}

impl PeakRenderer {
    pub fn new(urls: ObjectUrls, config: WaveformConfig) -> Result<Self, CollageError> {
        config.validate()?;
        Ok(Self {
            urls,
            fetcher: None,
            config,
        })
    }

    pub fn with_fetcher(mut self, fetcher: Arc<dyn SourceFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }
}

async fn load_source(
    source: SourceUrl,
    urls: ObjectUrls,
    fetcher: Option<Arc<dyn SourceFetcher>>,
    bar_count: usize,
) -> Result<WaveformSummary, CollageError> {
    let bytes = if source.is_object_url() {
        let blob = urls
            .resolve(&source)
            .ok_or_else(|| CollageError::Decode(format!("{} has been revoked", source)))?;
        blob.bytes.clone()
    } else {
        let fetcher = fetcher.ok_or_else(|| {
            CollageError::Decode(format!("no fetcher configured for {}", source))
        })?;
        fetcher
            .fetch_source(&source)
            .await
            .map_err(|e| CollageError::Decode(format!("failed to load {}: {}", source, e)))?
    };

    let info = wav_format::parse_wav(&bytes)?;
    let samples = wav_format::decode_pcm16_mono(&info)?;
    if samples.is_empty() {
        return Err(CollageError::Decode("source contains no samples".into()));
    }
    Ok(WaveformSummary {
        duration_secs: info.duration_secs(),
        peaks: levels::bar_levels(&samples, bar_count),
    })
}

impl WaveformRenderer for PeakRenderer {
    type Handle = PeakHandle;

    fn create(&self, source: &SourceUrl, events: EventEmitter<WaveformEvent>) -> PeakHandle {
        let decode = tokio::spawn(load_source(
            source.clone(),
            self.urls.clone(),
            self.fetcher.clone(),
            self.config.bar_count,
        ));
        PeakHandle {
            decode: Some(decode),
            summary: None,
            clock: Arc::new(Mutex::new(Clock::default())),
            ticker: None,
            tick_interval: self.config.tick_interval,
            events,
            destroyed: false,
        }
    }
}

#[derive(Debug, Default)]
struct Clock {
    duration_secs: f64,
    position_secs: f64,
    playing: bool,
}

/// Handle created by [`PeakRenderer`]. Owns the decode task and the playback tick loop.
pub struct PeakHandle {
    decode: Option<JoinHandle<Result<WaveformSummary, CollageError>>>,
    summary: Option<WaveformSummary>,
    clock: Arc<Mutex<Clock>>,
    ticker: Option<JoinHandle<()>>,
    tick_interval: Duration,
    events: EventEmitter<WaveformEvent>,
    destroyed: bool,
}

impl PeakHandle {
    fn stop_ticker(&mut self) {
        if let Some(ticker) = self.ticker.take() {
            ticker.abort();
        }
    }
}

async fn run_clock(clock: Arc<Mutex<Clock>>, events: EventEmitter<WaveformEvent>, tick: Duration) {
    let mut ticker = tokio::time::interval_at(Instant::now() + tick, tick);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut last = Instant::now();

    loop {
        ticker.tick().await;
        let now = Instant::now();
        let dt = (now - last).as_secs_f64();
        last = now;

        let (position_secs, duration_secs, finished) = {
            let mut c = clock.lock();
            if !c.playing {
                return;
            }
            c.position_secs = (c.position_secs + dt).min(c.duration_secs);
            let finished = c.position_secs >= c.duration_secs;
            if finished {
                c.playing = false;
            }
            (c.position_secs, c.duration_secs, finished)
        };

        events.emit(&WaveformEvent::Progress {
            position_secs,
            duration_secs,
        });
        if finished {
            events.emit(&WaveformEvent::Finished);
            return;
        }
    }
}

#[async_trait]
impl RenderHandle for PeakHandle {
    async fn ready(&mut self) -> Result<WaveformSummary, CollageError> {
        if let Some(summary) = &self.summary {
            return Ok(summary.clone());
        }
        let decode = self
            .decode
            .take()
            .ok_or_else(|| CollageError::Decode("render handle is not loadable".into()))?;
        let summary = decode
            .await
            .map_err(|e| CollageError::Decode(format!("decode task ended: {}", e)))??;
        self.clock.lock().duration_secs = summary.duration_secs;
        self.summary = Some(summary.clone());
        Ok(summary)
    }

    fn play(&mut self) {
        if self.destroyed || self.summary.is_none() {
            return;
        }
        {
            let mut c = self.clock.lock();
            if c.playing {
                return;
            }
            if c.position_secs >= c.duration_secs {
                c.position_secs = 0.0;
            }
            c.playing = true;
        }
        self.stop_ticker();
        self.ticker = Some(tokio::spawn(run_clock(
            Arc::clone(&self.clock),
            self.events.clone(),
            self.tick_interval,
        )));
    }

    fn pause(&mut self) {
        self.stop_ticker();
        self.clock.lock().playing = false;
    }

    fn is_playing(&self) -> bool {
        self.clock.lock().playing
    }

    fn seek_to(&mut self, ratio: f64) {
        let mut c = self.clock.lock();
        c.position_secs = ratio.clamp(0.0, 1.0) * c.duration_secs;
    }

    fn position_secs(&self) -> f64 {
        self.clock.lock().position_secs
    }

    fn duration_secs(&self) -> f64 {
        self.clock.lock().duration_secs
    }

    fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        self.destroyed = true;
        if let Some(decode) = self.decode.take() {
            decode.abort();
        }
        self.pause();
    }
}

impl Drop for PeakHandle {
    fn drop(&mut self) {
        self.destroy();
    }
}
