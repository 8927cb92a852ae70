//! Speaker amplifier enable line.
//!
//! The amplifier is powered only while audio is actually being emitted. The
//! line itself is hardware-specific and sits behind [`EnableLine`]; failures
//! to drive it are logged and otherwise ignored, matching how the rest of the
//! player treats peripheral hiccups.

use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

/// A digital output that switches the speaker power stage.
pub trait EnableLine: Send {
    /// Configure the line as an output.
    fn configure(&mut self) -> io::Result<()>;
    /// Drive the line high (`true`) or low.
    fn set_level(&mut self, high: bool) -> io::Result<()>;
    /// Return the line to its reset state.
    fn release(&mut self) -> io::Result<()>;
}

/// Line for boards without a switchable amplifier.
#[derive(Debug, Default)]
pub struct NoopLine;

impl EnableLine for NoopLine {
    fn configure(&mut self) -> io::Result<()> {
        Ok(())
    }

    fn set_level(&mut self, high: bool) -> io::Result<()> {
        tracing::trace!(high, "amp line (noop)");
        Ok(())
    }

    fn release(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Enable line driven through the Linux sysfs GPIO interface.
#[derive(Debug)]
pub struct SysfsGpioLine {
    root: PathBuf,
    pin: u32,
    exported: bool,
}

impl SysfsGpioLine {
    pub fn new(pin: u32) -> Self {
        Self::with_root("/sys/class/gpio", pin)
    }

    /// Use an alternate sysfs root (for chroots and tests).
    pub fn with_root(root: impl Into<PathBuf>, pin: u32) -> Self {
        Self {
            root: root.into(),
            pin,
            exported: false,
        }
    }

    fn pin_dir(&self) -> PathBuf {
        self.root.join(format!("gpio{}", self.pin))
    }
}

impl EnableLine for SysfsGpioLine {
    fn configure(&mut self) -> io::Result<()> {
        if !self.pin_dir().exists() {
            fs::write(self.root.join("export"), self.pin.to_string())?;
        }
        self.exported = true;
        fs::write(self.pin_dir().join("direction"), "out")?;
        self.set_level(false)
    }

    fn set_level(&mut self, high: bool) -> io::Result<()> {
        fs::write(self.pin_dir().join("value"), if high { "1" } else { "0" })
    }

    fn release(&mut self) -> io::Result<()> {
        if !self.exported {
            return Ok(());
        }
        self.exported = false;
        fs::write(self.root.join("unexport"), self.pin.to_string())
    }
}

/// Tracks and drives the amplifier enable line.
pub struct Amplifier {
    line: Mutex<Box<dyn EnableLine>>,
    enabled: AtomicBool,
}

impl Amplifier {
    pub fn new(line: Box<dyn EnableLine>) -> Self {
        Self {
            line: Mutex::new(line),
            enabled: AtomicBool::new(false),
        }
    }

    /// Configure the line as an output and drive it low.
    pub fn configure(&self) {
        let mut line = self.line.lock().unwrap_or_else(|e| e.into_inner());
        if let Err(e) = line.configure() {
            tracing::warn!("amp line configure failed: {e}");
        }
        self.enabled.store(false, Ordering::SeqCst);
    }

    pub fn enable(&self) {
        self.drive(true);
    }

    pub fn disable(&self) {
        self.drive(false);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// Drive the line low and hand it back to its reset state.
    pub fn release(&self) {
        let mut line = self.line.lock().unwrap_or_else(|e| e.into_inner());
        if let Err(e) = line.set_level(false) {
            tracing::warn!("amp disable failed: {e}");
        }
        self.enabled.store(false, Ordering::SeqCst);
        if let Err(e) = line.release() {
            tracing::warn!("amp line release failed: {e}");
        }
    }

    fn drive(&self, high: bool) {
        let mut line = self.line.lock().unwrap_or_else(|e| e.into_inner());
        if let Err(e) = line.set_level(high) {
            tracing::warn!(high, "amp line write failed: {e}");
        }
        self.enabled.store(high, Ordering::SeqCst);
    }
}

/// Keeps the amplifier enabled for a scope and disables it on every exit path.
pub(crate) struct AmpHold<'a> {
    amp: &'a Amplifier,
}

impl<'a> AmpHold<'a> {
    pub(crate) fn engage(amp: &'a Amplifier) -> Self {
        amp.enable();
        Self { amp }
    }
}

impl Drop for AmpHold<'_> {
    fn drop(&mut self) {
        self.amp.disable();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingLine;

    fn temp_root(tag: &str) -> PathBuf {
        let root = std::env::temp_dir().join(format!(
            "audio-play-gpio-{tag}-{}",
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap()
                .as_nanos()
        ));
        fs::create_dir_all(&root).unwrap();
        root
    }

    #[test]
    fn amplifier_tracks_line_level() {
        let line = RecordingLine::default();
        let levels = line.levels();
        let amp = Amplifier::new(Box::new(line));

        amp.configure();
        amp.enable();
        assert!(amp.is_enabled());
        amp.disable();
        assert!(!amp.is_enabled());

        assert_eq!(*levels.lock().unwrap(), vec![true, false]);
    }

    #[test]
    fn amp_hold_disables_on_early_return() {
        let amp = Amplifier::new(Box::new(RecordingLine::default()));
        let run = || -> Result<(), &'static str> {
            let _hold = AmpHold::engage(&amp);
            assert!(amp.is_enabled());
            Err("alloc failed")
        };
        assert!(run().is_err());
        assert!(!amp.is_enabled());
    }

    #[test]
    fn release_drives_low_and_releases() {
        let line = RecordingLine::default();
        let released = line.released();
        let amp = Amplifier::new(Box::new(line));
        amp.enable();
        amp.release();
        assert!(!amp.is_enabled());
        assert!(released.load(Ordering::SeqCst));
    }

    #[test]
    fn sysfs_line_exports_and_writes_value() {
        let root = temp_root("export");
        let pin_dir = root.join("gpio0");
        fs::create_dir_all(&pin_dir).unwrap();

        let mut line = SysfsGpioLine::with_root(&root, 0);
        line.configure().unwrap();
        assert_eq!(fs::read_to_string(pin_dir.join("direction")).unwrap(), "out");
        assert_eq!(fs::read_to_string(pin_dir.join("value")).unwrap(), "0");

        line.set_level(true).unwrap();
        assert_eq!(fs::read_to_string(pin_dir.join("value")).unwrap(), "1");

        line.release().unwrap();
        assert_eq!(fs::read_to_string(root.join("unexport")).unwrap(), "0");
    }

    #[test]
    fn sysfs_release_without_configure_is_noop() {
        let root = temp_root("noop");
        let mut line = SysfsGpioLine::with_root(&root, 7);
        line.release().unwrap();
        assert!(!root.join("unexport").exists());
    }
}
