// pressled control protocol definitions
// Opcodes follow the Linux ioctl number layout so tools that speak the
// character-device ABI can use the same numbers.

/// ioctl number encoding (asm-generic layout)
pub mod ioc {
    pub const NRBITS: u32 = 8;
    pub const TYPEBITS: u32 = 8;
    pub const SIZEBITS: u32 = 14;

    pub const NRSHIFT: u32 = 0;
    pub const TYPESHIFT: u32 = NRSHIFT + NRBITS;
    pub const SIZESHIFT: u32 = TYPESHIFT + TYPEBITS;
    pub const DIRSHIFT: u32 = SIZESHIFT + SIZEBITS;

    pub const NONE: u32 = 0;
    pub const WRITE: u32 = 1;
    pub const READ: u32 = 2;

    pub const fn encode(dir: u32, ty: u8, nr: u8, size: u32) -> u32 {
        (dir << DIRSHIFT) | ((ty as u32) << TYPESHIFT) | ((nr as u32) << NRSHIFT) | (size << SIZESHIFT)
    }

    /// `_IO(ty, nr)`
    pub const fn io(ty: u8, nr: u8) -> u32 {
        encode(NONE, ty, nr, 0)
    }

    /// `_IOR(ty, nr, int)`
    pub const fn ior_int(ty: u8, nr: u8) -> u32 {
        encode(READ, ty, nr, std::mem::size_of::<i32>() as u32)
    }
}

/// Structured control opcodes
pub mod opcode {
    use super::ioc;

    pub const LED_MAGIC: u8 = b'k';
    pub const BUTTON_MAGIC: u8 = b'b';

    pub const LED_ON: u32 = ioc::io(LED_MAGIC, 1); // 0x6B01
    pub const LED_OFF: u32 = ioc::io(LED_MAGIC, 2); // 0x6B02
    pub const LED_TOGGLE: u32 = ioc::io(LED_MAGIC, 3); // 0x6B03
    pub const GET_STATUS: u32 = ioc::ior_int(LED_MAGIC, 4); // 0x80046B04

    pub const BUTTON_GET_STATUS: u32 = ioc::ior_int(BUTTON_MAGIC, 1); // 0x80046201
    pub const BUTTON_RESET: u32 = ioc::io(BUTTON_MAGIC, 2); // 0x6202

    /// Human readable opcode name for logs
    pub fn name(op: u32) -> &'static str {
        match op {
            LED_ON => "LED_ON",
            LED_OFF => "LED_OFF",
            LED_TOGGLE => "LED_TOGGLE",
            GET_STATUS => "GET_STATUS",
            BUTTON_GET_STATUS => "BUTTON_GET_STATUS",
            BUTTON_RESET => "BUTTON_RESET",
            _ => "UNKNOWN",
        }
    }
}

/// Write tokens (first byte of a write)
pub mod token {
    pub const ON: u8 = b'1';
    pub const OFF: u8 = b'0';
    pub const TOGGLE: u8 = b't';
    pub const TOGGLE_UPPER: u8 = b'T';
    pub const RESET: u8 = b'r';
    pub const LOG_STATUS: u8 = b's';
}

/// Bits of the button GET_STATUS value
pub mod status_bits {
    /// At least one LED is lit
    pub const LED_ON: i32 = 1 << 0;
    /// Button line is at its pressed level right now
    pub const BUTTON_HELD: i32 = 1 << 1;
    /// A press was accepted since the last button read (peeked)
    pub const PRESSED_LATCH: i32 = 1 << 2;
}

/// Endpoint names
pub mod endpoint {
    pub const LED_PREFIX: &str = "led";
    pub const BUTTON: &str = "button";
    pub const ALL: &str = "all";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opcode_values() {
        assert_eq!(opcode::LED_ON, 0x6B01);
        assert_eq!(opcode::LED_OFF, 0x6B02);
        assert_eq!(opcode::LED_TOGGLE, 0x6B03);
        assert_eq!(opcode::GET_STATUS, 0x8004_6B04);
        assert_eq!(opcode::BUTTON_GET_STATUS, 0x8004_6201);
        assert_eq!(opcode::BUTTON_RESET, 0x6202);
    }

    #[test]
    fn test_opcode_names() {
        assert_eq!(opcode::name(opcode::LED_TOGGLE), "LED_TOGGLE");
        assert_eq!(opcode::name(0xdead), "UNKNOWN");
    }
}
