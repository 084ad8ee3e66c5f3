//! Analog-to-digital converter capability consumed by the sensor driver.

/// Largest code a 16 bit single-ended conversion can report
pub const FULL_SCALE: u16 = 32767;

/// A converter able to take a single blocking single-ended reading.
///
/// Implementations should return codes in `0..=FULL_SCALE`; the sensor model rejects anything
/// else, including zero.
pub trait AnalogSource {
    type Error: ::std::error::Error + Send + Sync + 'static;

    fn read_single_ended(&mut self, channel: u8) -> Result<u16, Self::Error>;
}

impl<A: AnalogSource + ?Sized> AnalogSource for &mut A {
    type Error = A::Error;

    fn read_single_ended(&mut self, channel: u8) -> Result<u16, Self::Error> {
        (**self).read_single_ended(channel)
    }
}

/// Error from a [`FixedSource`] asked for a channel it does not serve
#[derive(Debug, thiserror::Error)]
#[error("channel {0} is not connected")]
pub struct Disconnected(pub u8);

/// Converter substitute returning preset codes
///
/// Each channel replays its codes in order, repeating the last one once exhausted.
#[derive(Clone, Debug, Default)]
pub struct FixedSource {
    channels: Vec<(u8, Vec<u16>)>,
}

impl FixedSource {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_channel(mut self, channel: u8, codes: impl IntoIterator<Item = u16>) -> Self {
        let mut codes = codes.into_iter().collect::<Vec<_>>();
        codes.reverse();
        self.channels.retain(|(c, _)| *c != channel);
        self.channels.push((channel, codes));
        self
    }
}

impl AnalogSource for FixedSource {
    type Error = Disconnected;

    fn read_single_ended(&mut self, channel: u8) -> Result<u16, Self::Error> {
        let codes = self
            .channels
            .iter_mut()
            .find(|(c, _)| *c == channel)
            .map(|(_, codes)| codes)
            .ok_or(Disconnected(channel))?;

        match codes.len() {
            0 => Err(Disconnected(channel)),
            1 => Ok(codes[0]),
            _ => codes.pop().ok_or(Disconnected(channel)),
        }
    }
}
