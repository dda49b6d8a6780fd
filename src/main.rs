//! C-family Line Counter
//!
//! Recursively walks the given paths and classifies every physical line of
//! `.c`, `.h`, `.cpp` and `.hpp` files as code, blank or comment. Lines that
//! sit inside a multi-line string, character literal or block comment are
//! attributed using lexical state carried from one line to the next.

use clap::Parser;
use std::env;
use std::ffi::{OsStr, OsString};
use std::fmt;
use std::fs;
use std::io::{self, Write};
use std::iter::Sum;
use std::ops::{Add, AddAssign};
use std::path::{Path, PathBuf};

use colored::*;
use glob::Pattern;

const SOURCE_PATTERNS: [&str; 4] = ["*.c", "*.h", "*.cpp", "*.hpp"];

const METADATA_FAIL_TAG: &str = "__lcloc_metadata_fail__";
const READ_DIR_FAIL_TAG: &str = "__lcloc_read_dir_fail__";
const ENTRY_ITER_FAIL_TAG: &str = "__lcloc_entry_iter_fail__";
const READ_FAIL_TAG: &str = "__lcloc_read_fail__.c";
const FAULT_ENV_VAR: &str = "LCLOC_ENABLE_FAULTS";

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Counts code, blank and comment lines in C and C++ sources",
    long_about = "Recursively scans the given files and directories, skipping hidden entries, and counts lines of .c, .h, .cpp and .hpp files."
)]
struct Args {
    /// Files or directories to scan
    paths: Vec<PathBuf>,

    /// Display output in multiple colors
    #[arg(short, long)]
    color: bool,

    /// Print the lines of each individual file
    #[arg(short, long)]
    all: bool,

    /// Maximum directory depth below each given path
    #[arg(short = 'd', long, default_value = "100")]
    max_depth: usize,
}

/// Lexical context carried from one physical line to the next.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
enum LexState {
    #[default]
    Normal,
    InString,
    InChar,
    InBlockComment,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LineClass {
    Code,
    Blank,
    Comment,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct LineCounts {
    code: usize,
    blank: usize,
    comment: usize,
}

impl LineCounts {
    fn record(&mut self, class: LineClass) {
        match class {
            LineClass::Code => self.code += 1,
            LineClass::Blank => self.blank += 1,
            LineClass::Comment => self.comment += 1,
        }
    }
}

impl AddAssign for LineCounts {
    fn add_assign(&mut self, rhs: Self) {
        self.code += rhs.code;
        self.blank += rhs.blank;
        self.comment += rhs.comment;
    }
}

impl Add for LineCounts {
    type Output = Self;

    fn add(mut self, rhs: Self) -> Self::Output {
        self += rhs;
        self
    }
}

impl Sum for LineCounts {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(LineCounts::default(), Add::add)
    }
}

/// Running result of a scan. Sub-scans are folded in with [`Totals::merge`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct Totals {
    lines: LineCounts,
    file_count: usize,
    warnings: usize,
}

impl Totals {
    fn add_file(&mut self, counts: LineCounts) {
        self.lines += counts;
        self.file_count += 1;
    }

    fn merge(&mut self, other: Totals) {
        self.lines += other.lines;
        self.file_count += other.file_count;
        self.warnings += other.warnings;
    }
}

/// A recoverable problem with one entry. The entry is skipped and the scan goes on.
#[derive(Debug)]
enum ScanWarning {
    Stat { path: PathBuf, source: io::Error },
    DirOpen { path: PathBuf, source: io::Error },
    DirEntry { path: PathBuf, source: io::Error },
    FileRead { path: PathBuf, source: io::Error },
    DepthLimit { path: PathBuf, max_depth: usize },
}

impl fmt::Display for ScanWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScanWarning::Stat { path, source } => {
                write!(f, "failed to stat '{}': {}", path.display(), source)
            }
            ScanWarning::DirOpen { path, source } => {
                write!(f, "failed to open directory '{}': {}", path.display(), source)
            }
            ScanWarning::DirEntry { path, source } => {
                write!(f, "failed to read entry in '{}': {}", path.display(), source)
            }
            ScanWarning::FileRead { path, source } => {
                write!(f, "failed to open '{}': {}", path.display(), source)
            }
            ScanWarning::DepthLimit { path, max_depth } => write!(
                f,
                "maximum directory depth ({}) reached at '{}'",
                max_depth,
                path.display()
            ),
        }
    }
}

fn is_blank_byte(b: u8) -> bool {
    b == b' ' || b == b'\t'
}

/// Offset of the closing `quote` in `bytes`. A backslash escapes the byte after it.
fn find_closing_quote(bytes: &[u8], quote: u8) -> Option<usize> {
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b if b == quote => return Some(i),
            _ => i += 1,
        }
    }
    None
}

fn find_block_end(bytes: &[u8]) -> Option<usize> {
    bytes.windows(2).position(|w| w == b"*/")
}

/// Classify one physical line, updating `state` for the next line.
///
/// Whitespace-only lines are blank whatever the state, even inside an open
/// block comment. Otherwise a line with any code is code, a line with only
/// comment text is a comment.
fn classify(line: &[u8], state: &mut LexState) -> LineClass {
    if line.iter().all(|&b| is_blank_byte(b)) {
        return LineClass::Blank;
    }

    let mut has_code = false;
    let mut has_comment = false;
    let mut i = 0;

    while i < line.len() {
        match *state {
            LexState::InString | LexState::InChar => {
                has_code = true;
                let quote = if *state == LexState::InString {
                    b'"'
                } else {
                    b'\''
                };
                match find_closing_quote(&line[i..], quote) {
                    Some(end) => {
                        i += end + 1;
                        *state = LexState::Normal;
                    }
                    None => break,
                }
            }
            LexState::InBlockComment => {
                has_comment = true;
                match find_block_end(&line[i..]) {
                    Some(end) => {
                        i += end + 2;
                        *state = LexState::Normal;
                    }
                    None => break,
                }
            }
            LexState::Normal => match (line[i], line.get(i + 1).copied()) {
                (b'"', _) => {
                    has_code = true;
                    *state = LexState::InString;
                    i += 1;
                }
                (b'\'', _) => {
                    has_code = true;
                    *state = LexState::InChar;
                    i += 1;
                }
                (b'/', Some(b'*')) => {
                    has_comment = true;
                    *state = LexState::InBlockComment;
                    i += 2;
                }
                (b'/', Some(b'/')) => {
                    has_comment = true;
                    break;
                }
                (b, _) => {
                    if !is_blank_byte(b) {
                        has_code = true;
                    }
                    i += 1;
                }
            },
        }
    }

    if has_code {
        LineClass::Code
    } else if has_comment {
        LineClass::Comment
    } else {
        LineClass::Blank
    }
}

/// Split `content` on `\n` and classify each line with fresh lexical state.
///
/// `\r` is kept as line content. The segment after the last newline is
/// always classified, so a trailing newline adds one blank line.
fn count_lines(content: &[u8]) -> LineCounts {
    let mut state = LexState::Normal;
    let mut counts = LineCounts::default();
    for line in content.split(|&b| b == b'\n') {
        counts.record(classify(line, &mut state));
    }
    counts
}

fn failure_injection_enabled() -> bool {
    cfg!(test) || env::var_os(FAULT_ENV_VAR).is_some()
}

fn should_simulate_path_failure(path: &Path, needle: &str) -> bool {
    failure_injection_enabled()
        && path
            .file_name()
            .and_then(|name| name.to_str())
            .map(|name| name == needle)
            .unwrap_or(false)
}

fn fetch_metadata(path: &Path) -> io::Result<fs::Metadata> {
    if should_simulate_path_failure(path, METADATA_FAIL_TAG) {
        return Err(io::Error::other("simulated metadata read failure"));
    }
    fs::metadata(path)
}

/// Directory listing that can yield one simulated entry error before the real entries.
struct ReadDirStream {
    inner: fs::ReadDir,
    injected_error: Option<io::Error>,
}

impl Iterator for ReadDirStream {
    type Item = io::Result<fs::DirEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(err) = self.injected_error.take() {
            return Some(Err(err));
        }
        self.inner.next()
    }
}

fn read_dir_stream(path: &Path) -> io::Result<ReadDirStream> {
    if should_simulate_path_failure(path, READ_DIR_FAIL_TAG) {
        return Err(io::Error::other("simulated read_dir failure"));
    }
    let inner = fs::read_dir(path)?;
    let injected_error = should_simulate_path_failure(path, ENTRY_ITER_FAIL_TAG)
        .then(|| io::Error::other("simulated directory entry iteration failure"));
    Ok(ReadDirStream {
        inner,
        injected_error,
    })
}

fn read_source(path: &Path) -> io::Result<Vec<u8>> {
    if should_simulate_path_failure(path, READ_FAIL_TAG) {
        return Err(io::Error::other("simulated read failure"));
    }
    fs::read(path)
}

/// Read the whole file and count its lines.
fn count_file(path: &Path) -> io::Result<LineCounts> {
    let content = read_source(path)?;
    Ok(count_lines(&content))
}

/// `dir` without trailing separators, so children display as `dir/name`.
/// The root separator is kept.
fn trim_trailing_separators(dir: &Path) -> &Path {
    match dir.to_str() {
        Some(s) => {
            let trimmed = s.trim_end_matches(std::path::is_separator);
            if trimmed.is_empty() {
                dir
            } else {
                Path::new(trimmed)
            }
        }
        None => dir,
    }
}

fn is_hidden(name: &OsStr) -> bool {
    name.to_string_lossy().starts_with('.')
}

/// Accepted source extensions, matched case-sensitively against the file name.
struct SourceFilter {
    patterns: Vec<Pattern>,
}

impl SourceFilter {
    fn new() -> io::Result<Self> {
        let patterns = SOURCE_PATTERNS
            .iter()
            .map(|spec| {
                Pattern::new(spec).map_err(|err| {
                    io::Error::new(
                        io::ErrorKind::InvalidInput,
                        format!("Invalid source pattern '{}': {}", spec, err),
                    )
                })
            })
            .collect::<io::Result<Vec<_>>>()?;
        Ok(SourceFilter { patterns })
    }

    fn accepts(&self, path: &Path) -> bool {
        let Some(name) = path.file_name() else {
            return false;
        };
        let name = name.to_string_lossy();
        self.patterns.iter().any(|pattern| pattern.matches(&name))
    }
}

fn paint(value: usize, color: Color, enabled: bool) -> String {
    if enabled {
        value.to_string().color(color).to_string()
    } else {
        value.to_string()
    }
}

fn write_line_counts(out: &mut dyn Write, counts: &LineCounts, color: bool) -> io::Result<()> {
    writeln!(out, "code    {}", paint(counts.code, Color::BrightYellow, color))?;
    writeln!(out, "blank   {}", paint(counts.blank, Color::White, color))?;
    writeln!(
        out,
        "comment {}",
        paint(counts.comment, Color::BrightGreen, color)
    )
}

struct Scanner<'a> {
    filter: SourceFilter,
    color: bool,
    print_all: bool,
    max_depth: usize,
    out: &'a mut dyn Write,
    err: &'a mut dyn Write,
}

impl<'a> Scanner<'a> {
    fn new(args: &Args, out: &'a mut dyn Write, err: &'a mut dyn Write) -> io::Result<Self> {
        Ok(Scanner {
            filter: SourceFilter::new()?,
            color: args.color,
            print_all: args.all,
            max_depth: args.max_depth,
            out,
            err,
        })
    }

    fn warn(&mut self, totals: &mut Totals, warning: ScanWarning) {
        let _ = writeln!(self.err, "warning: {}", warning);
        totals.warnings += 1;
    }

    /// Scan one path and return what it contributed. Only output write
    /// failures are returned as errors.
    fn scan_path(&mut self, path: &Path, depth: usize) -> io::Result<Totals> {
        let mut totals = Totals::default();

        let metadata = match fetch_metadata(path) {
            Ok(meta) => meta,
            Err(source) => {
                let path = path.to_path_buf();
                self.warn(&mut totals, ScanWarning::Stat { path, source });
                return Ok(totals);
            }
        };

        if metadata.is_dir() {
            if depth > self.max_depth {
                let warning = ScanWarning::DepthLimit {
                    path: path.to_path_buf(),
                    max_depth: self.max_depth,
                };
                self.warn(&mut totals, warning);
                return Ok(totals);
            }
            let names = self.list_dir(path, &mut totals);
            let dir = trim_trailing_separators(path);
            for name in names {
                let sub_totals = self.scan_path(&dir.join(name), depth + 1)?;
                totals.merge(sub_totals);
            }
            return Ok(totals);
        }

        if !metadata.is_file() || !self.filter.accepts(path) {
            return Ok(totals);
        }

        match count_file(path) {
            Ok(counts) => {
                if self.print_all {
                    writeln!(self.out, "{}:", path.display())?;
                    write_line_counts(self.out, &counts, self.color)?;
                    writeln!(self.out)?;
                }
                totals.add_file(counts);
            }
            Err(source) => {
                let path = path.to_path_buf();
                self.warn(&mut totals, ScanWarning::FileRead { path, source });
            }
        }

        Ok(totals)
    }

    /// Visible entry names of `path` in sorted order.
    fn list_dir(&mut self, path: &Path, totals: &mut Totals) -> Vec<OsString> {
        let read_dir = match read_dir_stream(path) {
            Ok(iter) => iter,
            Err(source) => {
                let path = path.to_path_buf();
                self.warn(totals, ScanWarning::DirOpen { path, source });
                return Vec::new();
            }
        };

        let mut names = Vec::new();
        for entry_result in read_dir {
            match entry_result {
                Ok(entry) => {
                    let name = entry.file_name();
                    if !is_hidden(&name) {
                        names.push(name);
                    }
                }
                Err(source) => {
                    let path = path.to_path_buf();
                    self.warn(totals, ScanWarning::DirEntry { path, source });
                }
            }
        }
        names.sort();
        names
    }

    fn write_summary(&mut self, totals: &Totals) -> io::Result<()> {
        writeln!(self.out, "total across {} file(s):", totals.file_count)?;
        write_line_counts(self.out, &totals.lines, self.color)?;
        if totals.warnings > 0 {
            let _ = writeln!(
                self.err,
                "{}: {} path(s) skipped",
                env!("CARGO_PKG_NAME"),
                totals.warnings
            );
        }
        Ok(())
    }
}

fn main() -> io::Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    let mut err = io::stderr();
    run_with_args(env::args_os(), &mut out, &mut err)
}

fn run_with_args<I, T>(args: I, out: &mut dyn Write, err: &mut dyn Write) -> io::Result<()>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let args = Args::parse_from(args);
    run_cli(&args, out, err)
}

fn run_cli(args: &Args, out: &mut dyn Write, err: &mut dyn Write) -> io::Result<()> {
    if args.color {
        colored::control::set_override(true);
    }

    let mut scanner = Scanner::new(args, out, err)?;
    let mut totals = Totals::default();
    for path in &args.paths {
        let path_totals = scanner.scan_path(path, 0)?;
        totals.merge(path_totals);
    }

    scanner.write_summary(&totals)?;
    scanner.out.flush()
}
