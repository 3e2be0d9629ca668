//! LED state engine
//!
//! The bank owns every LED output line together with the state it last
//! published. All writes happen with `&mut LedBank`, which the driver only
//! hands out under its async bank lock, so the published state and the line
//! levels never disagree for a reader holding the same lock.

use pressled_line::{Level, OutputLine};
use tracing::{debug, warn};

use crate::error::ControlError;

/// Published LED state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum LedState {
    #[default]
    AllOff,
    /// Exactly this LED lit
    Slot(u8),
    AllOn,
    /// Any other combination (bit i = LED i lit)
    Mixed(u8),
}

/// Bit mask with the low `n` bits set
pub fn full_mask(n: usize) -> u8 {
    if n >= 8 {
        u8::MAX
    } else {
        ((1u16 << n) - 1) as u8
    }
}

impl LedState {
    /// State a committed press count maps to, for `n` LEDs
    ///
    /// `1..=n` lights one LED, `n + 1` lights all of them, anything else
    /// turns everything off.
    pub fn for_press_count(count: u8, n: usize) -> Self {
        let count = count as usize;
        if (1..=n).contains(&count) {
            LedState::Slot((count - 1) as u8)
        } else if count == n + 1 {
            LedState::AllOn
        } else {
            LedState::AllOff
        }
    }

    /// Canonical state for a line mask
    pub fn from_mask(mask: u8, n: usize) -> Self {
        let mask = mask & full_mask(n);
        if mask == 0 {
            LedState::AllOff
        } else if mask.count_ones() == 1 && n > 1 {
            LedState::Slot(mask.trailing_zeros() as u8)
        } else if mask == full_mask(n) {
            LedState::AllOn
        } else if mask.count_ones() == 1 {
            LedState::Slot(mask.trailing_zeros() as u8)
        } else {
            LedState::Mixed(mask)
        }
    }

    pub fn mask(self, n: usize) -> u8 {
        match self {
            LedState::AllOff => 0,
            LedState::Slot(i) => (1u8 << i) & full_mask(n),
            LedState::AllOn => full_mask(n),
            LedState::Mixed(mask) => mask & full_mask(n),
        }
    }

    /// Human readable form used in the button status text
    pub fn describe(self, names: &[String]) -> String {
        let n = names.len();
        match self {
            LedState::AllOff => "All LEDs OFF".to_string(),
            LedState::AllOn => "All LEDs ON".to_string(),
            LedState::Slot(i) => match names.get(i as usize) {
                Some(name) => format!("LED {i} ({name}) ON"),
                None => format!("LED {i} ON"),
            },
            LedState::Mixed(mask) => {
                let lit: Vec<&str> = names
                    .iter()
                    .enumerate()
                    .filter(|(i, _)| mask & full_mask(n) & (1 << i) != 0)
                    .map(|(_, name)| name.as_str())
                    .collect();
                format!("LEDs {} ON", lit.join(", "))
            }
        }
    }
}

/// One LED output line
pub struct LedSlot {
    pub index: usize,
    pub name: String,
    line: Box<dyn OutputLine>,
}

impl LedSlot {
    pub fn new(index: usize, name: impl Into<String>, line: Box<dyn OutputLine>) -> Self {
        Self {
            index,
            name: name.into(),
            line,
        }
    }
}

impl std::fmt::Debug for LedSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LedSlot")
            .field("index", &self.index)
            .field("name", &self.name)
            .field("offset", &self.line.info().offset)
            .finish()
    }
}

/// The LED output lines and their published state
#[derive(Debug)]
pub struct LedBank {
    slots: Vec<LedSlot>,
    state: LedState,
    released: bool,
}

impl LedBank {
    /// Wrap lines that were requested low
    pub fn new(slots: Vec<LedSlot>) -> Self {
        Self {
            slots,
            state: LedState::AllOff,
            released: false,
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn state(&self) -> LedState {
        self.state
    }

    pub fn mask(&self) -> u8 {
        self.state.mask(self.slots.len())
    }

    /// Levels actually driven on the lines, as a mask
    pub fn read_back(&self) -> Result<u8, ControlError> {
        let mut mask = 0u8;
        for slot in &self.slots {
            if slot.line.level()?.is_high() {
                mask |= 1 << slot.index;
            }
        }
        Ok(mask)
    }

    /// Drive the lines to `target` and publish it
    pub fn apply(&mut self, target: LedState) -> Result<LedState, ControlError> {
        self.ensure_live()?;
        self.write_mask(target.mask(self.slots.len()))?;
        self.state = target;
        Ok(target)
    }

    /// Set one LED, leaving the others alone
    pub fn set_led(&mut self, index: usize, on: bool) -> Result<LedState, ControlError> {
        let bit = self.bit(index)?;
        let mask = if on { self.mask() | bit } else { self.mask() & !bit };
        self.apply_mask(mask)
    }

    pub fn toggle_led(&mut self, index: usize) -> Result<LedState, ControlError> {
        let bit = self.bit(index)?;
        self.apply_mask(self.mask() ^ bit)
    }

    pub fn set_all(&mut self, on: bool) -> Result<LedState, ControlError> {
        let mask = if on { full_mask(self.slots.len()) } else { 0 };
        self.apply_mask(mask)
    }

    /// Flip every LED independently
    pub fn toggle_all(&mut self) -> Result<LedState, ControlError> {
        self.apply_mask(!self.mask() & full_mask(self.slots.len()))
    }

    /// Drive everything low and give the lines back
    pub fn release(&mut self) {
        if self.released {
            return;
        }
        for slot in &self.slots {
            if let Err(e) = slot.line.set_level(Level::Low) {
                warn!("Failed to turn off {}: {}", slot.name, e);
            }
        }
        self.state = LedState::AllOff;
        self.released = true;
        self.slots.clear();
        debug!("LED lines released");
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    fn apply_mask(&mut self, mask: u8) -> Result<LedState, ControlError> {
        let target = LedState::from_mask(mask, self.slots.len());
        self.apply(target)
    }

    fn bit(&self, index: usize) -> Result<u8, ControlError> {
        self.ensure_live()?;
        if index >= self.slots.len() {
            return Err(ControlError::NoSuchEndpoint(format!("led{index}")));
        }
        Ok(1 << index)
    }

    fn ensure_live(&self) -> Result<(), ControlError> {
        if self.released {
            Err(ControlError::ShutDown)
        } else {
            Ok(())
        }
    }

    /// Lows first, then highs; on failure put back what was already written
    fn write_mask(&mut self, target: u8) -> Result<(), ControlError> {
        let previous = self.mask();
        let order = self
            .slots
            .iter()
            .filter(|s| target & (1 << s.index) == 0)
            .chain(self.slots.iter().filter(|s| target & (1 << s.index) != 0));

        let mut written: Vec<&LedSlot> = Vec::with_capacity(self.slots.len());
        for slot in order {
            let level = Level::from(target & (1 << slot.index) != 0);
            if let Err(e) = slot.line.set_level(level) {
                warn!("Write to {} failed: {}, restoring previous levels", slot.name, e);
                for done in written {
                    let old = Level::from(previous & (1 << done.index) != 0);
                    if let Err(e) = done.line.set_level(old) {
                        warn!("Restore of {} failed: {}", done.name, e);
                    }
                }
                return Err(ControlError::Line(e));
            }
            written.push(slot);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pressled_line::{LineProvider, SimChip};

    const OFFSETS: [u32; 3] = [17, 27, 22];

    fn bank(chip: &SimChip) -> LedBank {
        let slots = ["green_led", "white_led", "yellow_led"]
            .iter()
            .zip(OFFSETS)
            .enumerate()
            .map(|(i, (name, offset))| {
                let line = chip.request_output(offset, "test", Level::Low).unwrap();
                LedSlot::new(i, *name, line)
            })
            .collect();
        LedBank::new(slots)
    }

    fn levels(chip: &SimChip) -> Vec<bool> {
        OFFSETS.iter().map(|o| chip.level(*o).is_high()).collect()
    }

    #[test]
    fn test_press_count_table() {
        assert_eq!(LedState::for_press_count(1, 3), LedState::Slot(0));
        assert_eq!(LedState::for_press_count(2, 3), LedState::Slot(1));
        assert_eq!(LedState::for_press_count(3, 3), LedState::Slot(2));
        assert_eq!(LedState::for_press_count(4, 3), LedState::AllOn);
        assert_eq!(LedState::for_press_count(5, 3), LedState::AllOff);
        assert_eq!(LedState::for_press_count(0, 3), LedState::AllOff);
        assert_eq!(LedState::for_press_count(200, 3), LedState::AllOff);
    }

    #[test]
    fn test_mask_roundtrip() {
        for mask in 0..8u8 {
            assert_eq!(LedState::from_mask(mask, 3).mask(3), mask);
        }
        assert_eq!(LedState::from_mask(0b101, 3), LedState::Mixed(0b101));
        assert_eq!(LedState::from_mask(0b111, 3), LedState::AllOn);
        assert_eq!(LedState::from_mask(0b010, 3), LedState::Slot(1));
    }

    #[test]
    fn test_describe() {
        let names: Vec<String> = ["green_led", "white_led", "yellow_led"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(LedState::AllOff.describe(&names), "All LEDs OFF");
        assert_eq!(LedState::Slot(1).describe(&names), "LED 1 (white_led) ON");
        assert_eq!(LedState::AllOn.describe(&names), "All LEDs ON");
        assert_eq!(
            LedState::Mixed(0b101).describe(&names),
            "LEDs green_led, yellow_led ON"
        );
    }

    #[test]
    fn test_apply_drives_lines() {
        let chip = SimChip::new("sim0");
        let mut bank = bank(&chip);

        bank.apply(LedState::Slot(2)).unwrap();
        assert_eq!(levels(&chip), vec![false, false, true]);
        assert_eq!(bank.read_back().unwrap(), bank.mask());

        bank.apply(LedState::AllOn).unwrap();
        assert_eq!(levels(&chip), vec![true, true, true]);

        bank.apply(LedState::AllOff).unwrap();
        assert_eq!(levels(&chip), vec![false, false, false]);
    }

    #[test]
    fn test_direct_commands_are_independent() {
        let chip = SimChip::new("sim0");
        let mut bank = bank(&chip);

        assert_eq!(bank.set_led(0, true).unwrap(), LedState::Slot(0));
        assert_eq!(bank.set_led(2, true).unwrap(), LedState::Mixed(0b101));
        assert_eq!(bank.toggle_led(0).unwrap(), LedState::Slot(2));
        assert_eq!(bank.toggle_all().unwrap(), LedState::Mixed(0b011));
        assert_eq!(bank.set_all(true).unwrap(), LedState::AllOn);
        assert!(matches!(bank.set_led(3, true), Err(ControlError::NoSuchEndpoint(_))));
    }

    #[test]
    fn test_failed_write_rolls_back() {
        let chip = SimChip::new("sim0");
        let mut bank = bank(&chip);
        bank.apply(LedState::Slot(0)).unwrap();

        // Target Slot(1): green goes low first, white's write fails
        chip.fail_writes(27, true);
        assert!(bank.apply(LedState::Slot(1)).is_err());
        assert_eq!(bank.state(), LedState::Slot(0));
        assert_eq!(levels(&chip), vec![true, false, false]);
    }

    #[test]
    fn test_release() {
        let chip = SimChip::new("sim0");
        let mut bank = bank(&chip);
        bank.apply(LedState::AllOn).unwrap();

        bank.release();
        assert!(bank.is_released());
        assert_eq!(levels(&chip), vec![false, false, false]);
        assert!(OFFSETS.iter().all(|o| !chip.is_claimed(*o)));
        assert!(matches!(bank.apply(LedState::AllOn), Err(ControlError::ShutDown)));
    }
}
