// GPIO edge source - Raspberry Pi tachometer inputs via interrupt callbacks
use crate::application::tachometer::{EdgeSender, EdgeSource, EdgeSourceError};
use rppal::gpio::{Gpio, InputPin, Trigger};
use std::collections::HashMap;
use std::time::Instant;

/// Open-drain tachometer outputs, read with the internal pull-up enabled
pub struct RppalEdgeSource {
    gpio: Gpio,
    pins: HashMap<u32, InputPin>,
}

impl RppalEdgeSource {
    pub fn new() -> anyhow::Result<Self> {
        Ok(Self {
            gpio: Gpio::new()?,
            pins: HashMap::new(),
        })
    }
}

fn bcm_pin(line: u32) -> Result<u8, EdgeSourceError> {
    u8::try_from(line).map_err(|_| EdgeSourceError::LineUnavailable {
        line,
        reason: "not a BCM pin number".to_string(),
    })
}

impl EdgeSource for RppalEdgeSource {
    fn watch(&mut self, line: u32, edges: EdgeSender) -> Result<(), EdgeSourceError> {
        let unavailable = |err: rppal::gpio::Error| EdgeSourceError::LineUnavailable {
            line,
            reason: err.to_string(),
        };

        let mut pin = self
            .gpio
            .get(bcm_pin(line)?)
            .map_err(unavailable)?
            .into_input_pullup();
        pin.set_async_interrupt(Trigger::RisingEdge, None, move |_event| {
            edges.on_edge(Instant::now());
        })
        .map_err(unavailable)?;

        self.pins.insert(line, pin);
        Ok(())
    }

    fn release(&mut self, line: u32) {
        if let Some(mut pin) = self.pins.remove(&line) {
            if let Err(err) = pin.clear_async_interrupt() {
                tracing::warn!(line, error = %err, "failed to clear tachometer interrupt");
            }
        }
    }
}
