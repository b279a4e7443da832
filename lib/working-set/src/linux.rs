use std::{
    ffi::OsStr,
    fs::{self, File},
    io::{self, Read, Write as _},
    os::unix::ffi::OsStrExt as _,
    path::{Path, PathBuf},
};

use snafu::ResultExt as _;

use crate::{
    error::{ProcessNotAccessible, QueryFailed},
    ProcessId, QueryError,
};

const PROC_ROOT: &str = "/proc";
const SMAPS_ROLLUP_PROBE_PATH: &str = "/proc/self/smaps_rollup";
const SMAPS_PROBE_PATH: &str = "/proc/self/smaps";
const RSS_LINE_PREFIX: &[u8] = b"Rss:";
const SCANNER_BUFFER_SIZE: usize = 8192;

/// Which procfs file the resident set size is read from.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum CounterFile {
    SmapsRollup,
    Smaps,
    Statm,
}

impl CounterFile {
    fn file_name(self) -> &'static str {
        match self {
            Self::SmapsRollup => "smaps_rollup",
            Self::Smaps => "smaps",
            Self::Statm => "statm",
        }
    }

    fn detect() -> Self {
        if fs::metadata(SMAPS_ROLLUP_PROBE_PATH).is_ok() {
            Self::SmapsRollup
        } else if fs::metadata(SMAPS_PROBE_PATH).is_ok() {
            Self::Smaps
        } else {
            Self::Statm
        }
    }
}

enum StatSource {
    SmapsRollup(Scanner),
    Smaps(Scanner),
    Statm(u64),
}

impl StatSource {
    fn from_counter_file(counter_file: CounterFile) -> Self {
        match counter_file {
            CounterFile::SmapsRollup => Self::SmapsRollup(Scanner::with_capacity(SCANNER_BUFFER_SIZE)),
            CounterFile::Smaps => Self::Smaps(Scanner::with_capacity(SCANNER_BUFFER_SIZE)),
            CounterFile::Statm => Self::Statm(page_size()),
        }
    }

    fn counter_file(&self) -> CounterFile {
        match self {
            Self::SmapsRollup(_) => CounterFile::SmapsRollup,
            Self::Smaps(_) => CounterFile::Smaps,
            Self::Statm(_) => CounterFile::Statm,
        }
    }
}

/// A working-set querier.
pub(crate) struct Querier {
    proc_root: PathBuf,
    source: StatSource,
}

impl Querier {
    pub(crate) fn with_counter_file(counter_file: CounterFile) -> Self {
        Self::with_proc_root(PROC_ROOT, counter_file)
    }

    /// Creates a querier that reads counters from `<proc_root>/<pid>/<file>` instead of procfs.
    pub(crate) fn with_proc_root<P: Into<PathBuf>>(proc_root: P, counter_file: CounterFile) -> Self {
        Self {
            proc_root: proc_root.into(),
            source: StatSource::from_counter_file(counter_file),
        }
    }

    pub(crate) fn working_set_size(&mut self, pid: ProcessId) -> Result<u64, QueryError> {
        let counter_file = self.source.counter_file();
        let path =
            ProcPath::new(&self.proc_root, pid, counter_file.file_name()).context(ProcessNotAccessible { pid })?;

        // Opening the counters file is what stands in for acquiring a process handle: procfs checks that the process
        // exists, and for `smaps`/`smaps_rollup`, that we're allowed to read its memory maps. The file is dropped, and
        // the descriptor closed, when this function returns.
        //
        // Zombies (exited but not yet reaped) have no memory maps left, and are rejected here with `ESRCH`.
        let mut file = File::open(path.as_path()).context(ProcessNotAccessible { pid })?;

        let result = match &mut self.source {
            // smaps_rollup is pre-aggregated, so there's only one "Rss:" line that we need to find.
            StatSource::SmapsRollup(scanner) => {
                scanner.reset();
                first_rss_line(scanner, &mut file)
            }

            // Each "Rss:" line in smaps holds the resident set size of a single mapping, so we aggregate them all.
            StatSource::Smaps(scanner) => {
                scanner.reset();
                sum_rss_lines(scanner, &mut file)
            }
            StatSource::Statm(page_size) => read_statm_rss(&mut file, *page_size),
        };

        result.context(QueryFailed { pid })
    }
}

impl Default for Querier {
    fn default() -> Self {
        Self::with_counter_file(CounterFile::detect())
    }
}

const PROC_PATH_MAX_LEN: usize = 256;

/// A `<proc_root>/<pid>/<file>` path, formatted on the stack.
struct ProcPath {
    buf: [u8; PROC_PATH_MAX_LEN],
    len: usize,
}

impl ProcPath {
    fn new(proc_root: &Path, pid: ProcessId, file_name: &str) -> io::Result<Self> {
        let mut buf = [0; PROC_PATH_MAX_LEN];
        let mut remaining = &mut buf[..];
        remaining.write_all(proc_root.as_os_str().as_bytes())?;
        write!(remaining, "/{}/{}", pid, file_name)?;
        let len = PROC_PATH_MAX_LEN - remaining.len();

        Ok(Self { buf, len })
    }

    fn as_path(&self) -> &Path {
        Path::new(OsStr::from_bytes(&self.buf[..self.len]))
    }
}

fn invalid_data() -> io::Error {
    io::ErrorKind::InvalidData.into()
}

fn page_size() -> u64 {
    // SAFETY: `sysconf` has no preconditions.
    let page_size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if page_size <= 0 {
        0
    } else {
        page_size as u64
    }
}

fn first_rss_line<R: Read>(scanner: &mut Scanner, io: &mut R) -> io::Result<u64> {
    match scanner.next_matching_line(io, RSS_LINE_PREFIX)? {
        Some(line) => parse_rss_line(line).ok_or_else(invalid_data),
        None => Err(invalid_data()),
    }
}

fn sum_rss_lines<R: Read>(scanner: &mut Scanner, io: &mut R) -> io::Result<u64> {
    let mut seen_any = false;
    let mut total_rss_bytes: u64 = 0;
    while let Some(line) = scanner.next_matching_line(io, RSS_LINE_PREFIX)? {
        let rss_bytes = parse_rss_line(line).ok_or_else(invalid_data)?;
        total_rss_bytes = total_rss_bytes.saturating_add(rss_bytes);
        seen_any = true;
    }

    if seen_any {
        Ok(total_rss_bytes)
    } else {
        Err(invalid_data())
    }
}

fn read_statm_rss<R: Read>(io: &mut R, page_size: u64) -> io::Result<u64> {
    // statm is a single line of seven space-delimited integer fields, so a small stack buffer holds all of it.
    let mut buf = [0; 256];
    let n = io.read(&mut buf)?;
    if n == 0 || n == buf.len() {
        return Err(invalid_data());
    }

    // Resident set size is the second field, in pages.
    let raw_rss_field = buf[..n].split(|b| *b == b' ').nth(1).ok_or_else(invalid_data)?;
    let rss_pages = parse_u64(raw_rss_field).ok_or_else(invalid_data)?;
    rss_pages.checked_mul(page_size).ok_or_else(invalid_data)
}

fn parse_rss_line(raw_line: &[u8]) -> Option<u64> {
    skip_to_line_value(raw_line).and_then(parse_kb_value_as_bytes)
}

fn skip_to_line_value(raw_line: &[u8]) -> Option<&[u8]> {
    // Skip over everything up to the first digit; lines without any digits have no value.
    raw_line
        .iter()
        .position(|b| b.is_ascii_digit())
        .map(|idx| &raw_line[idx..])
}

fn parse_kb_value_as_bytes(raw_value: &[u8]) -> Option<u64> {
    // The raw value is in the form of `XXXXXX kB`.
    let space_idx = raw_value.iter().position(|&b| b == b' ')?;
    if &raw_value[space_idx + 1..] != b"kB" {
        return None;
    }

    parse_u64(&raw_value[..space_idx])?.checked_mul(1024)
}

fn parse_u64(raw: &[u8]) -> Option<u64> {
    std::str::from_utf8(raw).ok()?.trim_end().parse::<u64>().ok()
}

/// A line scanner over a fixed-capacity buffer.
///
/// The scanner does not own the reader it scans, so that the caller controls how long the underlying file stays open.
struct Scanner {
    eof: bool,
    buf: Vec<u8>,
    pending_consume: Option<usize>,
    discarding: bool,
}

impl Scanner {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            eof: false,
            buf: Vec::with_capacity(capacity),
            pending_consume: None,
            discarding: false,
        }
    }

    fn reset(&mut self) {
        self.buf.clear();
        self.eof = false;
        self.pending_consume = None;
        self.discarding = false;
    }

    fn fill_buf<R: Read>(&mut self, io: &mut R) -> io::Result<()> {
        if self.eof || self.buf.len() == self.buf.capacity() {
            return Ok(());
        }

        let filled = self.buf.len();
        let capacity = self.buf.capacity();

        // Extending with zeroes within capacity never reallocates.
        self.buf.resize(capacity, 0);
        let result = io.read(&mut self.buf[filled..]);
        let n = *result.as_ref().unwrap_or(&0);
        self.buf.truncate(filled + n);

        if result? == 0 {
            self.eof = true;
        }

        Ok(())
    }

    fn next_matching_line<R: Read>(&mut self, io: &mut R, prefix: &[u8]) -> io::Result<Option<&[u8]>> {
        loop {
            if let Some(consume) = self.pending_consume.take() {
                self.buf.drain(..consume);
            }

            self.fill_buf(io)?;

            // We've reached EOF and have processed the entire file.
            if self.eof && self.buf.is_empty() {
                return Ok(None);
            }

            let maybe_newline_idx = self.buf.iter().position(|&b| b == b'\n');

            // We're in the middle of a line that was too long to fit in the buffer, so skip the rest of it.
            if self.discarding {
                match maybe_newline_idx {
                    Some(newline_idx) => {
                        self.pending_consume = Some(newline_idx + 1);
                        self.discarding = false;
                    }
                    None => self.buf.clear(),
                }
                continue;
            }

            match maybe_newline_idx {
                Some(newline_idx) => {
                    // Consume up to and including the newline character, but only hand back the bytes up to the
                    // newline.
                    self.pending_consume = Some(newline_idx + 1);
                    if self.buf.starts_with(prefix) {
                        return Ok(Some(&self.buf[..newline_idx]));
                    }
                }
                None if self.eof => {
                    // A final line with no trailing newline.
                    let len = self.buf.len();
                    self.pending_consume = Some(len);
                    if self.buf.starts_with(prefix) {
                        return Ok(Some(&self.buf[..len]));
                    }
                }
                None if self.buf.len() == self.buf.capacity() => {
                    self.buf.clear();
                    self.discarding = true;
                }
                None => {}
            }
        }
    }
}
