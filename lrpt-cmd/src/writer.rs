//! File-backed sinks: per-channel payload files, corrupted-frame dumps, and
//! the optional intermediate stream dumps.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::Context;
use lrpt::pipeline::{ChannelSink, DumpStage, StreamTap};
use lrpt::Result;
use tracing::debug;

/// Writes accepted payloads to `channel_<vcid>.bin` files, created lazily as
/// channels appear, and corrupted-frame material alongside them.
pub struct FileChannelWriter {
    dir: PathBuf,
    channels: HashMap<u8, File>,
}

impl FileChannelWriter {
    pub fn new(dir: &Path) -> anyhow::Result<Self> {
        fs::create_dir_all(dir).with_context(|| format!("creating output dir {dir:?}"))?;
        Ok(FileChannelWriter {
            dir: dir.to_path_buf(),
            channels: HashMap::new(),
        })
    }

    fn append(&self, name: &str, buf: &[u8]) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.dir.join(name))?;
        file.write_all(buf)?;
        Ok(())
    }
}

impl ChannelSink for FileChannelWriter {
    fn write_channel(&mut self, payload: &[u8], vcid: u8) -> Result<()> {
        let file = match self.channels.entry(vcid) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                let path = self.dir.join(format!("channel_{vcid}.bin"));
                debug!(vcid, ?path, "opening channel file");
                let file = OpenOptions::new().create(true).append(true).open(path)?;
                entry.insert(file)
            }
        };
        file.write_all(payload)?;
        Ok(())
    }

    fn dump_corrupted(&mut self, buf: &[u8], stage: DumpStage) -> Result<()> {
        self.append(&format!("corrupted_{}.bin", stage.code()), buf)
    }

    fn dump_corrupted_stats(&mut self, viterbi_ber: u32, correlation: u32) -> Result<()> {
        self.append(
            "corrupted_stats.txt",
            format!("{viterbi_ber} {correlation}\n").as_bytes(),
        )
    }
}

/// Mirrors the intermediate pipeline streams to disk for offline analysis:
/// the resynced soft stream, the phase-fixed stream, and the Viterbi output.
pub struct StreamDumper {
    synced: File,
    fixed: File,
    decoded: File,
}

impl StreamDumper {
    pub fn new(dir: &Path) -> anyhow::Result<Self> {
        fs::create_dir_all(dir).with_context(|| format!("creating output dir {dir:?}"))?;
        let open = |name: &str| {
            File::create(dir.join(name)).with_context(|| format!("creating stream dump {name}"))
        };
        Ok(StreamDumper {
            synced: open("sync.data")?,
            fixed: open("enc.data")?,
            decoded: open("dec.data")?,
        })
    }
}

impl StreamTap for StreamDumper {
    fn synced(&mut self, window: &[u8]) -> Result<()> {
        self.synced.write_all(window)?;
        Ok(())
    }

    fn fixed(&mut self, window: &[u8]) -> Result<()> {
        self.fixed.write_all(window)?;
        Ok(())
    }

    fn decoded(&mut self, frame: &[u8]) -> Result<()> {
        self.decoded.write_all(frame)?;
        Ok(())
    }
}
