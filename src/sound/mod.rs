//! Sound collaborator
//!
//! `SOUND`, `ENVELOPE` and the synthesiser settings (`STEREO`, `TEMPO`,
//! `BEATS`, `VOICES`, `VOICE`) hand their parameters to a `Sound` device.
//! `NullSound` plays nothing and keeps a log of what it was asked to do.

use crate::error::{ErrorKind, Result};
use log::debug;
use std::cell::RefCell;
use std::rc::Rc;

/// Sound interface
pub trait Sound {
    fn sound(&mut self, channel: i32, amplitude: i32, pitch: i32, duration: i32) -> Result<()>;
    fn envelope(&mut self, params: &[i32]) -> Result<()>;
    /// Place `channel` between left (-127) and right (127)
    fn stereo(&mut self, channel: i32, position: i32) -> Result<()>;
    fn tempo(&mut self, tempo: i32) -> Result<()>;
    fn beats(&mut self, beats: i32) -> Result<()>;
    /// Number of active channels
    fn voices(&mut self, count: i32) -> Result<()>;
    fn voice(&mut self, channel: i32, name: &str) -> Result<()>;
}

impl<S: Sound> Sound for Rc<RefCell<S>> {
    fn sound(&mut self, channel: i32, amplitude: i32, pitch: i32, duration: i32) -> Result<()> {
        self.borrow_mut().sound(channel, amplitude, pitch, duration)
    }

    fn envelope(&mut self, params: &[i32]) -> Result<()> {
        self.borrow_mut().envelope(params)
    }

    fn stereo(&mut self, channel: i32, position: i32) -> Result<()> {
        self.borrow_mut().stereo(channel, position)
    }

    fn tempo(&mut self, tempo: i32) -> Result<()> {
        self.borrow_mut().tempo(tempo)
    }

    fn beats(&mut self, beats: i32) -> Result<()> {
        self.borrow_mut().beats(beats)
    }

    fn voices(&mut self, count: i32) -> Result<()> {
        self.borrow_mut().voices(count)
    }

    fn voice(&mut self, channel: i32, name: &str) -> Result<()> {
        self.borrow_mut().voice(channel, name)
    }
}

/// A request received by `NullSound`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SoundRequest {
    Note {
        channel: i32,
        amplitude: i32,
        pitch: i32,
        duration: i32,
    },
    Envelope(Vec<i32>),
    Stereo { channel: i32, position: i32 },
    Tempo(i32),
    Beats(i32),
    Voices(i32),
    Voice { channel: i32, name: String },
}

/// Silent sound device
#[derive(Debug, Clone, Default)]
pub struct NullSound {
    pub requests: Vec<SoundRequest>,
}

impl NullSound {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&mut self, request: SoundRequest) -> Result<()> {
        debug!("{:?}", request);
        self.requests.push(request);
        Ok(())
    }
}

impl Sound for NullSound {
    fn sound(&mut self, channel: i32, amplitude: i32, pitch: i32, duration: i32) -> Result<()> {
        self.record(SoundRequest::Note {
            channel,
            amplitude,
            pitch,
            duration,
        })
    }

    fn envelope(&mut self, params: &[i32]) -> Result<()> {
        self.record(SoundRequest::Envelope(params.to_vec()))
    }

    fn stereo(&mut self, channel: i32, position: i32) -> Result<()> {
        if !(-127..=127).contains(&position) {
            return Err(ErrorKind::BadCall.into());
        }
        self.record(SoundRequest::Stereo { channel, position })
    }

    fn tempo(&mut self, tempo: i32) -> Result<()> {
        self.record(SoundRequest::Tempo(tempo))
    }

    fn beats(&mut self, beats: i32) -> Result<()> {
        self.record(SoundRequest::Beats(beats))
    }

    fn voices(&mut self, count: i32) -> Result<()> {
        if !matches!(count, 1 | 2 | 4 | 8) {
            return Err(ErrorKind::BadCall.into());
        }
        self.record(SoundRequest::Voices(count))
    }

    fn voice(&mut self, channel: i32, name: &str) -> Result<()> {
        self.record(SoundRequest::Voice {
            channel,
            name: name.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requests_are_logged() {
        let mut sound = NullSound::new();
        sound.sound(1, -15, 53, 20).unwrap();
        sound.envelope(&[1, 2, 3]).unwrap();
        assert_eq!(sound.requests.len(), 2);
        assert_eq!(
            sound.requests[0],
            SoundRequest::Note {
                channel: 1,
                amplitude: -15,
                pitch: 53,
                duration: 20
            }
        );
    }

    #[test]
    fn test_settings_are_range_checked() {
        let mut sound = NullSound::new();
        sound.stereo(2, -100).unwrap();
        sound.voices(4).unwrap();
        assert_eq!(sound.stereo(1, 200).unwrap_err().kind, ErrorKind::BadCall);
        assert_eq!(sound.voices(3).unwrap_err().kind, ErrorKind::BadCall);
        assert_eq!(
            sound.requests,
            vec![
                SoundRequest::Stereo { channel: 2, position: -100 },
                SoundRequest::Voices(4),
            ]
        );
    }
}
