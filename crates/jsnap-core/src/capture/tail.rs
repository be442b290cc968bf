//! Exact-byte tail positioning.
//!
//! Repositions a file's read cursor so that a read to EOF yields exactly
//! the last `n` newline-delimited lines. Used immediately before upload
//! to bound the transmitted byte range for very large logs.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};

/// Backward scan block size. Memory use is bounded by this constant
/// regardless of file size.
const SCAN_BLOCK: usize = 8 * 1024;

/// Position the cursor so a read to EOF yields exactly the last `n` lines.
///
/// Rules:
/// - Lines are delimited by `\n`. A trailing `\n` at EOF terminates the
///   final line and does not count as an additional empty line.
/// - `n == 0` leaves the cursor at EOF (a subsequent read yields nothing).
/// - An empty file leaves the cursor at the start.
/// - Fewer than `n` available lines leaves the cursor at the start.
pub fn position_last_lines(file: &mut File, n: u64) -> io::Result<()> {
    let size = file.seek(SeekFrom::End(0))?;
    if size == 0 {
        file.seek(SeekFrom::Start(0))?;
        return Ok(());
    }
    if n == 0 {
        // Already at EOF.
        return Ok(());
    }

    let mut last_byte = [0u8; 1];
    file.seek(SeekFrom::Start(size - 1))?;
    file.read_exact(&mut last_byte)?;

    // When the file ends in a newline, that newline terminates the last
    // line; skip it by requiring one extra separator before stopping.
    let mut remaining = if last_byte[0] == b'\n' { n + 1 } else { n };

    let mut block = vec![0u8; SCAN_BLOCK];
    let mut end = size;
    while end > 0 {
        let start = end.saturating_sub(SCAN_BLOCK as u64);
        let len = (end - start) as usize;
        file.seek(SeekFrom::Start(start))?;
        file.read_exact(&mut block[..len])?;

        for offset in (0..len).rev() {
            if block[offset] == b'\n' {
                remaining -= 1;
                if remaining == 0 {
                    // One byte past the newline that completed the count.
                    file.seek(SeekFrom::Start(start + offset as u64 + 1))?;
                    return Ok(());
                }
            }
        }
        end = start;
    }

    // The whole file holds fewer than n lines.
    file.seek(SeekFrom::Start(0))?;
    Ok(())
}

/// Position the cursor at the start of the file (whole-file transfer).
pub fn position_start(file: &mut File) -> io::Result<()> {
    file.seek(SeekFrom::Start(0))?;
    Ok(())
}

/// The standard bound applied to large text artifacts before upload.
pub fn position_last_5000(file: &mut File) -> io::Result<()> {
    position_last_lines(file, 5000)
}
