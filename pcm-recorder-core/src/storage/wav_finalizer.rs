use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::{Path, PathBuf};

use crate::models::audio_models::PcmFormat;
use crate::models::error::CaptureError;
use crate::processing::wav_format::{WavHeader, MAX_WAV_DATA_SIZE};

use super::file_sink::{remove_quietly, FileSink};

const COPY_CHUNK: usize = 64 * 1024;

/// Temporary raw-PCM path used while recording to `dest`.
pub fn part_path(dest: &Path) -> PathBuf {
    let mut name = dest.as_os_str().to_owned();
    name.push(".pcm.part");
    PathBuf::from(name)
}

/// Fill `buf` from `reader`, retrying short reads until it is full or the
/// reader hits EOF. Returns the number of bytes read.
pub fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Turn the raw PCM in `part` into a WAV file at `dest`.
///
/// Writes the 44-byte header sized from the part file, then the payload
/// unmodified, syncs, and removes `part`. Returns the data chunk size.
pub fn finalize_wav(part: &Path, dest: &Path, format: &PcmFormat) -> Result<u64, CaptureError> {
    let mut input = File::open(part)
        .map_err(|e| CaptureError::SinkIoFailure(format!("failed to open {}: {}", part.display(), e)))?;
    let data_size = input
        .metadata()
        .map_err(|e| CaptureError::SinkIoFailure(format!("failed to stat {}: {}", part.display(), e)))?
        .len();
    if data_size > MAX_WAV_DATA_SIZE {
        return Err(CaptureError::SinkIoFailure(format!(
            "{} bytes of PCM exceed the WAV limit of {}",
            data_size, MAX_WAV_DATA_SIZE
        )));
    }

    let header = WavHeader::new(format, data_size as u32);
    let mut output = FileSink::create(dest)?;
    let copied = copy_payload(&mut input, &mut output, &header);
    let closed = copied.and_then(|copied| {
        output.close()?;
        Ok(copied)
    });

    match closed {
        Ok(copied) if copied == data_size => {
            remove_quietly(part);
            log::debug!("Finalized {} with {} bytes of PCM", dest.display(), data_size);
            Ok(data_size)
        }
        Ok(copied) => {
            output.discard();
            Err(CaptureError::SinkIoFailure(format!(
                "{} changed while finalizing: expected {} bytes, read {}",
                part.display(),
                data_size,
                copied
            )))
        }
        Err(e) => {
            output.discard();
            Err(e)
        }
    }
}

fn copy_payload(input: &mut File, output: &mut FileSink, header: &WavHeader) -> Result<u64, CaptureError> {
    output.write_boundary(&header.to_bytes())?;
    let mut chunk = vec![0u8; COPY_CHUNK];
    let mut copied = 0u64;
    loop {
        let n = read_full(input, &mut chunk)
            .map_err(|e| CaptureError::SinkIoFailure(format!("failed to read PCM payload: {}", e)))?;
        if n == 0 {
            return Ok(copied);
        }
        output.write(&chunk[..n])?;
        copied += n as u64;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::audio_models::ChannelLayout;
    use crate::processing::wav_format::WAV_HEADER_SIZE;
    use std::fs;
    use std::io::Cursor;

    #[test]
    fn part_path_appends_suffix() {
        assert_eq!(part_path(Path::new("/tmp/take.wav")), PathBuf::from("/tmp/take.wav.pcm.part"));
    }

    #[test]
    fn read_full_retries_short_reads() {
        struct Trickle(Cursor<Vec<u8>>);
        impl Read for Trickle {
            fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
                let len = buf.len().min(3);
                self.0.read(&mut buf[..len])
            }
        }

        let mut reader = Trickle(Cursor::new((0..10).collect()));
        let mut buf = [0u8; 8];
        assert_eq!(read_full(&mut reader, &mut buf).unwrap(), 8);
        assert_eq!(buf, [0, 1, 2, 3, 4, 5, 6, 7]);
        assert_eq!(read_full(&mut reader, &mut buf).unwrap(), 2);
    }

    #[test]
    fn finalize_prepends_header_and_removes_part() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("out.wav");
        let part = part_path(&dest);
        let payload: Vec<u8> = (0..1_000u32).map(|i| (i % 256) as u8).collect();
        fs::write(&part, &payload).unwrap();

        let format = PcmFormat::new(22_050, ChannelLayout::Stereo, 16);
        assert_eq!(finalize_wav(&part, &dest, &format).unwrap(), 1_000);

        let bytes = fs::read(&dest).unwrap();
        assert_eq!(bytes.len(), WAV_HEADER_SIZE + 1_000);
        let header = WavHeader::parse(&bytes).unwrap();
        assert_eq!(header.data_size, 1_000);
        assert_eq!(header.channels, 2);
        assert_eq!(header.sample_rate, 22_050);
        assert_eq!(&bytes[WAV_HEADER_SIZE..], &payload[..]);
        assert!(!part.exists());
    }

    #[test]
    fn empty_part_gives_header_only_file() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("silent.wav");
        let part = part_path(&dest);
        fs::write(&part, b"").unwrap();

        assert_eq!(finalize_wav(&part, &dest, &PcmFormat::default()).unwrap(), 0);
        assert_eq!(fs::metadata(&dest).unwrap().len(), WAV_HEADER_SIZE as u64);
    }

    #[test]
    fn missing_part_is_sink_failure() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("x.wav");
        let err = finalize_wav(&part_path(&dest), &dest, &PcmFormat::default()).unwrap_err();
        assert!(matches!(err, CaptureError::SinkIoFailure(_)));
        assert!(!dest.exists());
    }
}
