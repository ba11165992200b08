//! Background redraw thread
//!
//! [`RedrawDriver`] moves a compositor onto a dedicated thread and redraws
//! whatever viewport was posted most recently. Viewports posted while a
//! frame is in progress are coalesced, so the thread never falls behind
//! the input.

use crate::compositor::{DrawStats, ViewportCompositor};
use crate::mailbox::ViewportMailbox;
use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tilecache_render::{BoxError, TileRequest, TileResult, Viewport};

/// Outcome of one redraw
#[derive(Debug)]
pub struct FrameReport {
    /// Frame number, starting at 1
    pub frame: u64,

    /// Viewport the frame was drawn for
    pub viewport: Viewport,

    pub result: TileResult<DrawStats>,
}

impl FrameReport {
    /// The viewport was refused before any tile was drawn
    ///
    /// A failed generator is not a rejection: earlier tiles of that frame
    /// were already drawn.
    pub fn is_rejected(&self) -> bool {
        self.result.as_ref().is_err_and(|error| error.is_layout_error())
    }
}

/// Owns a compositor on its own thread and redraws on request
pub struct RedrawDriver<C: Send + Sync + 'static> {
    mailbox: Arc<ViewportMailbox>,
    thread: Option<JoinHandle<ViewportCompositor<C>>>,
}

impl<C: Send + Sync + 'static> RedrawDriver<C> {
    /// Start the redraw thread
    ///
    /// `generator` and `draw` are passed to every
    /// [`draw`](ViewportCompositor::draw) call. `report` receives the outcome
    /// of each frame, including failed ones; a failed frame does not stop
    /// the thread.
    pub fn spawn<G, E, D, R>(
        compositor: ViewportCompositor<C>,
        mut generator: G,
        mut draw: D,
        mut report: R,
    ) -> io::Result<Self>
    where
        G: FnMut(&TileRequest) -> Result<C, E> + Send + 'static,
        E: Into<BoxError>,
        D: FnMut(f64, f64, &C) + Send + 'static,
        R: FnMut(FrameReport) + Send + 'static,
    {
        let mailbox = Arc::new(ViewportMailbox::new());
        let inbox = Arc::clone(&mailbox);

        let builder = thread::Builder::new().name("tilecache-redraw".to_string());
        let thread = builder.spawn(move || {
            let mut frame = 0;
            while let Some(viewport) = inbox.take() {
                frame += 1;
                let result = compositor.draw(&viewport, &mut generator, &mut draw);
                match &result {
                    Err(error) if error.is_layout_error() => {
                        tracing::warn!(frame, %error, "viewport rejected")
                    }
                    Err(error) => tracing::warn!(frame, %error, "redraw aborted mid-frame"),
                    Ok(_) => {}
                }
                report(FrameReport { frame, viewport, result });
            }
            tracing::debug!(frames = frame, "redraw thread exiting");
            compositor
        })?;

        Ok(Self { mailbox, thread: Some(thread) })
    }

    /// Ask for a redraw of `viewport`
    ///
    /// Replaces any viewport still waiting to be drawn. Returns `false` after
    /// shutdown has begun.
    pub fn request_redraw(&self, viewport: Viewport) -> bool {
        self.mailbox.post(viewport)
    }

    /// Number of requests dropped in favour of a newer viewport
    pub fn coalesced(&self) -> u64 {
        self.mailbox.coalesced()
    }

    /// Finish the pending frame, stop the thread and return the compositor
    ///
    /// Returns `None` if the redraw thread panicked.
    pub fn shutdown(mut self) -> Option<ViewportCompositor<C>> {
        self.mailbox.close();
        self.thread.take().and_then(|thread| thread.join().ok())
    }
}

impl<C: Send + Sync + 'static> Drop for RedrawDriver<C> {
    fn drop(&mut self) {
        self.mailbox.close();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::convert::Infallible;
    use std::sync::mpsc;
    use tilecache_cache::CacheConfig;
    use tilecache_render::{DataRect, TileError, TileKey};

    fn compositor() -> ViewportCompositor<TileKey> {
        ViewportCompositor::from_config(&CacheConfig::new(-1, 64, 64)).unwrap()
    }

    fn viewport() -> Viewport {
        Viewport::new(400, 400, DataRect::new(0.0, 0.0, 10.0, 10.0))
    }

    #[test]
    fn test_driver_draws_requested_viewport() {
        let (tx, rx) = mpsc::channel();
        let driver = RedrawDriver::spawn(
            compositor(),
            |req: &TileRequest| Ok::<_, Infallible>(req.key),
            |_, _, _| {},
            move |report| tx.send(report).unwrap(),
        )
        .unwrap();

        assert!(driver.request_redraw(viewport()));
        let report = rx.recv().unwrap();
        assert_eq!(report.frame, 1);
        assert_eq!(report.viewport, viewport());
        assert_eq!(report.result.unwrap().tiles_drawn, 49);

        let compositor = driver.shutdown().unwrap();
        assert_eq!(compositor.stats().entry_count, 49);
    }

    #[test]
    fn test_driver_coalesces_requests_during_frame() {
        let (started_tx, started_rx) = mpsc::channel();
        let (gate_tx, gate_rx) = mpsc::channel::<()>();
        let (report_tx, report_rx) = mpsc::channel();

        let mut blocked = false;
        let generator = move |req: &TileRequest| {
            if !blocked {
                blocked = true;
                started_tx.send(()).unwrap();
                gate_rx.recv().unwrap();
            }
            Ok::<_, Infallible>(req.key)
        };

        let driver = RedrawDriver::spawn(compositor(), generator, |_, _, _| {}, move |report| {
            report_tx.send(report).unwrap()
        })
        .unwrap();

        driver.request_redraw(viewport());
        started_rx.recv().unwrap();

        // Frame 1 is blocked in the generator; these collapse into one frame
        for step in 1..=3 {
            driver.request_redraw(viewport().pan_pixels(64.0 * step as f64, 0.0));
        }
        assert_eq!(driver.coalesced(), 2);

        gate_tx.send(()).unwrap();
        driver.shutdown().unwrap();

        let reports: Vec<FrameReport> = report_rx.iter().collect();
        assert_eq!(reports.len(), 2);
        assert_eq!(reports[1].frame, 2);
        assert_eq!(reports[1].viewport, viewport().pan_pixels(192.0, 0.0));
    }

    #[test]
    fn test_failed_frame_does_not_stop_driver() {
        let (tx, rx) = mpsc::channel();
        let driver = RedrawDriver::spawn(
            compositor(),
            |req: &TileRequest| Ok::<_, Infallible>(req.key),
            |_, _, _| {},
            move |report| tx.send(report).unwrap(),
        )
        .unwrap();

        driver.request_redraw(Viewport::new(0, 0, DataRect::new(0.0, 0.0, 1.0, 1.0)));
        let report = rx.recv().unwrap();
        assert!(report.is_rejected());
        assert!(matches!(report.result, Err(TileError::InvalidViewport(_))));

        driver.request_redraw(viewport());
        let report = rx.recv().unwrap();
        assert!(!report.is_rejected());
        assert!(report.result.is_ok());
    }

    #[test]
    fn test_generation_failure_is_not_a_rejection() {
        let (tx, rx) = mpsc::channel();
        let driver = RedrawDriver::spawn(
            compositor(),
            |req: &TileRequest| {
                if req.key == TileKey::new(2, 2) {
                    Err("no data")
                } else {
                    Ok(req.key)
                }
            },
            |_, _, _| {},
            move |report| tx.send(report).unwrap(),
        )
        .unwrap();

        driver.request_redraw(viewport());
        let report = rx.recv().unwrap();
        assert!(!report.is_rejected());
        assert!(matches!(report.result, Err(TileError::GenerationFailed { .. })));
    }

    #[test]
    fn test_requests_rejected_after_drop_begins() {
        let driver = RedrawDriver::spawn(
            compositor(),
            |req: &TileRequest| Ok::<_, Infallible>(req.key),
            |_, _, _| {},
            |_| {},
        )
        .unwrap();
        let mailbox = Arc::clone(&driver.mailbox);

        drop(driver);
        assert!(mailbox.is_closed());
        assert!(!mailbox.post(viewport()));
    }
}
