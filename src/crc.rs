//! CRC-16/CCITT used to protect the Q subchannel (polynomial 0x1021,
//! initial value 0, MSB first).

/// Lookup table for `crc16`, built at compile time.
pub static CRC16_TABLE: [u16; 256] = build_crc16_table();

const fn build_crc16_table() -> [u16; 256] {
    let mut table = [0u16; 256];
    let mut i = 0;

    while i < 256 {
        let mut value: u16 = 0;
        let mut temp: u16 = (i as u16) << 8;
        let mut j = 0;

        while j < 8 {
            if (value ^ temp) & 0x8000 != 0 {
                value = (value << 1) ^ 0x1021;
            } else {
                value <<= 1;
            }

            temp <<= 1;
            j += 1;
        }

        table[i] = value;
        i += 1;
    }

    table
}

/// Compute the CRC-16/CCITT of `data`
pub fn crc16(data: &[u8]) -> u16 {
    data.iter().fold(0u16, |crc, &b| {
        let index = (b ^ (crc >> 8) as u8) as usize;

        (crc << 8) ^ CRC16_TABLE[index]
    })
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn check_value() {
        // CRC-16/XMODEM check value (same polynomial and init)
        assert_eq!(crc16(b"123456789"), 0x31c3);
        assert_eq!(crc16(&[]), 0);
    }

    #[test]
    fn table() {
        assert_eq!(CRC16_TABLE[0], 0);
        assert_eq!(CRC16_TABLE[1], 0x1021);
        assert_eq!(CRC16_TABLE[255], 0x1ef0);
    }
}
