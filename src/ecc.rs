//! CD-ROM error detection (EDC) and correction (ECC) codes.
//!
//! The EDC is a 32bit CRC computed over the header and user data of
//! Mode 1 and Mode 2 Form 1/Form 2 sectors. The ECC is the "product
//! code" described in Annex A of ECMA-130: two Reed-Solomon parity
//! bytes (P) for each of the 86 columns of the sector, followed by two
//! parity bytes (Q) for each of its 52 diagonals.
//!
//! All the lookup tables are computed at compile time.

use byteorder::{ByteOrder, LittleEndian};

/// Size of a raw CD sector
pub const SECTOR_SIZE: usize = 2352;

/// Offset of the P parity bytes in the sector
pub const P_PARITY_OFFSET: usize = 12 + 2064;

/// Offset of the Q parity bytes in the sector
pub const Q_PARITY_OFFSET: usize = 12 + 2236;

/// EDC lookup table, derived from the bit-reversed polynomial
/// `0x8001801b`
pub static EDC_TABLE: [u32; 256] = build_edc_table();

/// Multiplication by 2 in GF(2^8) (reduction polynomial 0x11d)
pub static MUL2: [u8; 256] = build_mul2_table();

/// Inverse of the `x ^ 2x` mapping, used to solve for the parity bytes
pub static DIV3: [u8; 256] = build_div3_table();

const fn build_edc_table() -> [u32; 256] {
    let poly = 0x8001_801bu32.reverse_bits();
    let mut table = [0u32; 256];
    let mut i = 0;

    while i < 256 {
        let mut crc = i as u32;
        let mut j = 0;

        while j < 8 {
            crc = if crc & 1 != 0 { (crc >> 1) ^ poly } else { crc >> 1 };
            j += 1;
        }

        table[i] = crc;
        i += 1;
    }

    table
}

const fn build_mul2_table() -> [u8; 256] {
    let mut table = [0u8; 256];
    let mut i = 0;

    while i < 256 {
        let n = i * 2;
        let mut b = n & 0xff;

        if n > 0xff {
            b ^= 0x1d;
        }

        table[i] = b as u8;
        i += 1;
    }

    table
}

const fn build_div3_table() -> [u8; 256] {
    let mul2 = build_mul2_table();
    let mut table = [0u8; 256];
    let mut i = 0;

    while i < 256 {
        let x3 = mul2[i] ^ (i as u8);

        table[x3 as usize] = i as u8;
        i += 1;
    }

    table
}

/// Compute the EDC of `data`
pub fn edc(data: &[u8]) -> u32 {
    data.iter()
        .fold(0u32, |crc, &b| EDC_TABLE[((crc ^ b as u32) & 0xff) as usize] ^ (crc >> 8))
}

/// Compute the EDC of `sector[start..start + len]` and store it
/// little-endian at `sector[dest..dest + 4]`
pub fn edc_store(sector: &mut [u8], start: usize, len: usize, dest: usize) {
    let crc = edc(&sector[start..start + len]);

    LittleEndian::write_u32(&mut sector[dest..dest + 4], crc);
}

/// Compute one pair of parity bytes. `data` starts at the sector
/// header (offset 12 of the raw sector) and addresses wrap around
/// the 2236 bytes covered by the Q parity.
fn parity_pair(data: &[u8], mut addr: usize, addr_add: usize, todo: usize) -> (u8, u8) {
    let mut pow_accum = 0u8;
    let mut add_accum = 0u8;

    for _ in 0..todo {
        addr %= 1118 * 2;

        let d = data[addr];
        addr += addr_add;

        add_accum ^= d;
        pow_accum = MUL2[(pow_accum ^ d) as usize];
    }

    let p0 = DIV3[(MUL2[pow_accum as usize] ^ add_accum) as usize];
    let p1 = p0 ^ add_accum;

    (p0, p1)
}

/// Fill the 276 ECC bytes of `sector`. When `zero_header` is set the
/// four header bytes are treated as zero for the computation (Mode 2
/// Form 1 convention) and restored afterwards.
pub fn ecc_populate(sector: &mut [u8; SECTOR_SIZE], zero_header: bool) {
    let header = *array_ref![sector, 12, 4];

    if zero_header {
        sector[12..16].fill(0);
    }

    {
        let data = &mut sector[12..];

        // P parity: 86 columns of 24 bytes
        for col in 0..86 {
            let (p0, p1) = parity_pair(data, col, 86, 24);

            data[2064 + col] = p0;
            data[2064 + col + 86] = p1;
        }

        // Q parity: 52 diagonals of 43 bytes, covering the P parity
        for d in 0..26 {
            for w in 0..2 {
                let (q0, q1) = parity_pair(data, d * 86 + w, 88, 43);

                data[2236 + d * 2 + w] = q0;
                data[2236 + d * 2 + w + 52] = q1;
            }
        }
    }

    sector[12..16].copy_from_slice(&header);
}

/// Regenerate the EDC and ECC of a Mode 1 sector. The header and user
/// data must already be in place.
pub fn ecm_mode1(sector: &mut [u8; SECTOR_SIZE]) {
    edc_store(sector, 0, 2064, 2064);
    sector[2068..2076].fill(0);
    ecc_populate(sector, false);
}

/// Regenerate the EDC and ECC of a Mode 2 Form 1 sector. The header,
/// subheader and user data must already be in place.
pub fn ecm_mode2_form1(sector: &mut [u8; SECTOR_SIZE]) {
    edc_store(sector, 16, 2048 + 8, 2072);
    ecc_populate(sector, true);
}

/// Regenerate the EDC of a Mode 2 Form 2 sector (there's no ECC in
/// form 2).
pub fn ecm_mode2_form2(sector: &mut [u8; SECTOR_SIZE]) {
    edc_store(sector, 16, 2324 + 8, 2348);
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn tables() {
        assert_eq!(EDC_TABLE[1], 0x9091_0101);
        assert_eq!(EDC_TABLE[128], 0xd801_8001);
        assert_eq!(MUL2[0x80], 0x1d);
        assert_eq!(MUL2[0x01], 0x02);

        for i in 0..=255u8 {
            assert_eq!(DIV3[(MUL2[i as usize] ^ i) as usize], i);
        }
    }

    #[test]
    fn edc_check_value() {
        assert_eq!(edc(b"123456789"), 0x6ec2_edc4);
    }

    #[test]
    fn edc_is_deterministic() {
        let data: Vec<u8> = (0..2064u32).map(|i| (i * 7 + 3) as u8).collect();

        assert_eq!(edc(&data), edc(&data));
        assert_ne!(edc(&data), edc(&data[1..]));
    }

    #[test]
    fn zero_sector_has_zero_parity() {
        let mut sector = [0u8; SECTOR_SIZE];

        ecc_populate(&mut sector, false);

        assert!(sector.iter().all(|&b| b == 0));
    }

    #[test]
    fn ecc_idempotent() {
        let mut sector = [0u8; SECTOR_SIZE];

        for (i, b) in sector.iter_mut().enumerate().take(2064) {
            *b = (i as u32).wrapping_mul(2_654_435_761).rotate_right(13) as u8;
        }
        sector[15] = 1;

        ecm_mode1(&mut sector);

        let first = sector;

        ecm_mode1(&mut sector);
        assert!(first[..] == sector[..]);

        ecc_populate(&mut sector, false);
        assert!(first[..] == sector[..]);

        // The parity must actually depend on the data
        sector[100] ^= 1;
        ecm_mode1(&mut sector);
        assert!(first[P_PARITY_OFFSET..] != sector[P_PARITY_OFFSET..]);
    }

    #[test]
    fn zero_header_is_restored() {
        let mut sector = [0u8; SECTOR_SIZE];

        sector[12..16].copy_from_slice(&[0x00, 0x02, 0x00, 0x02]);
        sector[24] = 0x55;

        ecm_mode2_form1(&mut sector);
        assert_eq!(&sector[12..16], &[0x00, 0x02, 0x00, 0x02]);

        // Same sector with a different address: the ECC shouldn't change
        let mut other = sector;
        other[12..16].copy_from_slice(&[0x01, 0x23, 0x45, 0x02]);
        ecm_mode2_form1(&mut other);

        assert!(sector[P_PARITY_OFFSET..] == other[P_PARITY_OFFSET..]);
    }
}
