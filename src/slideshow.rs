//! Home page slideshow: carousel navigation and a cancellable auto-advance task.

use std::time::Duration;
use tokio::sync::mpsc;
use tracing::debug;

/// Position within a list of images, wrapping at both ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Carousel {
  len: usize,
  current: usize,
}

impl Carousel {
  pub fn new(len: usize) -> Self {
    Self { len, current: 0 }
  }

  pub fn len(&self) -> usize {
    self.len
  }

  pub fn is_empty(&self) -> bool {
    self.len == 0
  }

  pub fn current(&self) -> usize {
    self.current
  }

  /// Index shown after the current one.
  pub fn upcoming(&self) -> usize {
    if self.len == 0 {
      0
    } else {
      (self.current + 1) % self.len
    }
  }

  pub fn next(&mut self) -> usize {
    self.current = self.upcoming();
    self.current
  }

  pub fn prev(&mut self) -> usize {
    if self.len > 0 {
      self.current = if self.current == 0 {
        self.len - 1
      } else {
        self.current - 1
      };
    }
    self.current
  }

  /// Jump to `index`; out-of-range indices are ignored.
  pub fn select(&mut self, index: usize) -> usize {
    if index < self.len {
      self.current = index;
    }
    self.current
  }
}

/// Timing for the auto-advance task
#[derive(Debug, Clone)]
pub struct SlideshowConfig {
  /// Time between transitions
  pub interval: Duration,
  /// Fade duration before the next image becomes current
  pub transition: Duration,
}

impl Default for SlideshowConfig {
  fn default() -> Self {
    Self {
      interval: Duration::from_secs(5),
      transition: Duration::from_secs(1),
    }
  }
}

#[derive(Debug)]
enum Control {
  Pause,
  Resume,
}

/// Handle for a running slideshow
pub struct SlideshowHandle {
  /// Receives the new current index after each transition
  pub receiver: mpsc::Receiver<usize>,
  control_tx: mpsc::Sender<Control>,
  shutdown_tx: mpsc::Sender<()>,
}

impl SlideshowHandle {
  /// Spawn the auto-advance task for `len` images.
  ///
  /// With fewer than two images nothing ever advances and the receiver
  /// closes immediately.
  pub fn spawn(len: usize, config: SlideshowConfig) -> Self {
    let (index_tx, index_rx) = mpsc::channel(8);
    let (control_tx, mut control_rx) = mpsc::channel(8);
    let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);

    if len > 1 {
      tokio::spawn(async move {
        let mut carousel = Carousel::new(len);
        let mut playing = true;
        let mut interval = tokio::time::interval(config.interval);
        // Skip the first tick (immediate)
        interval.tick().await;

        'run: loop {
          tokio::select! {
            _ = interval.tick() => {
              if !playing {
                continue;
              }
              let transition = tokio::time::sleep(config.transition);
              tokio::pin!(transition);
              loop {
                tokio::select! {
                  _ = &mut transition => break,
                  Some(control) = control_rx.recv() => {
                    // A pause abandons the transition; the carousel stays put
                    if matches!(control, Control::Pause) {
                      playing = false;
                      continue 'run;
                    }
                  }
                  _ = shutdown_rx.recv() => break 'run,
                }
              }
              let index = carousel.next();
              debug!(index, "Slideshow advanced");
              if index_tx.send(index).await.is_err() {
                break;
              }
            }
            Some(control) = control_rx.recv() => {
              playing = matches!(control, Control::Resume);
            }
            _ = shutdown_rx.recv() => {
              break;
            }
          }
        }
      });
    }

    Self {
      receiver: index_rx,
      control_tx,
      shutdown_tx,
    }
  }

  pub async fn pause(&self) {
    let _ = self.control_tx.send(Control::Pause).await;
  }

  pub async fn resume(&self) {
    let _ = self.control_tx.send(Control::Resume).await;
  }

  /// Stop the task; an in-progress transition is abandoned.
  pub async fn shutdown(self) {
    let _ = self.shutdown_tx.send(()).await;
  }
}
