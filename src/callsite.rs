//! Call-site attribution for logged queries.
//!
//! A raw backtrace taken inside the logger is mostly noise: runtime start-up,
//! closure shims, future polling and this crate's own frames. The filter drops
//! those and keeps the few frames that point at application code.

use std::path::{Path, PathBuf};

use backtrace::Backtrace;

/// Number of frames kept when no explicit depth is configured.
pub const DEFAULT_MAX_DEPTH: usize = 10;

/// Symbol prefixes of dispatch and start-up frames that never identify a call site.
const FORWARDING_PREFIXES: &[&str] = &[
    "backtrace::",
    "core::ops::function::",
    "core::panic::",
    "core::future::",
    "std::rt::",
    "std::panic::",
    "std::panicking::",
    "std::sys::",
    "std::thread::",
    "__rust_",
    "__libc_start",
    "<alloc::boxed::Box<",
    "<core::pin::Pin<",
    "tokio::runtime::",
    "tracing::span::",
    "<tracing::instrument::Instrumented<",
];

const FORWARDING_IMPLS: &[&str] = &[
    " as core::ops::function::Fn",
    " as core::future::future::Future>::poll",
];

/// One stack frame as reported by the symbolizer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame {
    pub function: Option<String>,
    pub file: Option<PathBuf>,
    pub line: Option<u32>,
}

/// Captures the current stack and reduces it to application call sites.
#[derive(Debug, Clone)]
pub struct BacktraceFilter {
    include_dirs: Vec<PathBuf>,
    exclude_dirs: Vec<PathBuf>,
    base_dir: Option<PathBuf>,
}

impl Default for BacktraceFilter {
    fn default() -> Self {
        Self {
            include_dirs: Vec::new(),
            exclude_dirs: vec![
                PathBuf::from(concat!(env!("CARGO_MANIFEST_DIR"), "/src")),
                PathBuf::from("/rustc"),
            ],
            base_dir: std::env::current_dir().ok(),
        }
    }
}

impl BacktraceFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve relative paths and shorten displayed paths against `dir`
    /// instead of the current working directory.
    pub fn with_base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_dir = Some(dir.into());
        self
    }

    /// Only keep frames whose file lives under one of the include directories.
    pub fn add_include_dir(&mut self, dir: impl AsRef<Path>) {
        let dir = self.absolute(dir.as_ref());
        self.include_dirs.push(dir);
    }

    pub fn add_exclude_dir(&mut self, dir: impl AsRef<Path>) {
        let dir = self.absolute(dir.as_ref());
        self.exclude_dirs.push(dir);
    }

    pub fn include_dirs(&self) -> &[PathBuf] {
        &self.include_dirs
    }

    pub fn exclude_dirs(&self) -> &[PathBuf] {
        &self.exclude_dirs
    }

    /// Capture the current stack, filtered and rendered, innermost first.
    pub fn capture(&self, max_depth: usize) -> Vec<String> {
        self.capture_raw(max_depth)
            .iter()
            .map(|frame| self.describe(frame))
            .collect()
    }

    pub fn capture_raw(&self, max_depth: usize) -> Vec<RawFrame> {
        let backtrace = Backtrace::new();
        let frames = backtrace
            .frames()
            .iter()
            .flat_map(|frame| frame.symbols())
            .map(|symbol| RawFrame {
                function: symbol.name().map(|name| format!("{name:#}")),
                file: symbol.filename().map(Path::to_path_buf),
                line: symbol.lineno(),
            });
        self.filter(frames, max_depth)
    }

    /// Apply the skip, exclude and include rules, keeping at most `max_depth` frames.
    pub fn filter<I>(&self, frames: I, max_depth: usize) -> Vec<RawFrame>
    where
        I: IntoIterator<Item = RawFrame>,
    {
        let mut kept = Vec::new();
        if max_depth == 0 {
            return kept;
        }

        for frame in frames {
            if frame.line.is_none() || frame.function.as_deref().is_some_and(is_forwarding) {
                continue;
            }
            if let Some(file) = &frame.file {
                let path = self.absolute(file);
                if self.exclude_dirs.iter().any(|dir| path.starts_with(dir)) {
                    continue;
                }
                if !self.include_dirs.is_empty()
                    && !self.include_dirs.iter().any(|dir| path.starts_with(dir))
                {
                    continue;
                }
            }
            kept.push(frame);
            if kept.len() == max_depth {
                break;
            }
        }
        kept
    }

    /// Render a frame as `file:line` or `file:line Type::method()`.
    pub fn describe(&self, frame: &RawFrame) -> String {
        let file = frame
            .file
            .as_deref()
            .map(|file| self.display_path(file))
            .unwrap_or_default();
        let line = frame.line.unwrap_or_default();

        match frame.function.as_deref().and_then(MethodCall::parse) {
            Some(call) => format!(
                "{file}:{line} {}{}{}()",
                call.type_name, call.separator, call.method
            ),
            None => format!("{file}:{line}"),
        }
    }

    fn absolute(&self, path: &Path) -> PathBuf {
        match &self.base_dir {
            Some(base) if path.is_relative() => base.join(path),
            _ => path.to_path_buf(),
        }
    }

    fn display_path(&self, path: &Path) -> String {
        let path = self.absolute(path);
        match &self.base_dir {
            Some(base) => path.strip_prefix(base).unwrap_or(&path).display().to_string(),
            None => path.display().to_string(),
        }
    }
}

fn is_forwarding(function: &str) -> bool {
    FORWARDING_PREFIXES.iter().any(|p| function.starts_with(p))
        || FORWARDING_IMPLS.iter().any(|p| function.contains(p))
}

/// The type and method a symbol belongs to.
#[derive(Debug, PartialEq, Eq)]
struct MethodCall<'a> {
    type_name: &'a str,
    /// `::` for inherent associated functions, `.` for trait methods.
    separator: &'static str,
    method: &'a str,
}

impl<'a> MethodCall<'a> {
    fn parse(symbol: &'a str) -> Option<Self> {
        let mut symbol = symbol;
        while let Some(outer) = symbol.strip_suffix("::{{closure}}") {
            symbol = outer;
        }

        if symbol.starts_with('<') {
            let close = matching_angle(symbol)?;
            let qualified = &symbol[1..close];
            let method = split_path(symbol[close + 1..].strip_prefix("::")?)
                .pop()?;
            let (self_ty, separator) = match find_top_level(qualified, " as ") {
                Some(idx) => (&qualified[..idx], "."),
                None => (qualified, "::"),
            };
            return Some(MethodCall {
                type_name: short_type_name(self_ty),
                separator,
                method,
            });
        }

        let segments = split_path(symbol);
        if segments.len() < 2 {
            return None;
        }
        let owner = short_type_name(segments[segments.len() - 2]);
        if !owner.starts_with(|c: char| c.is_ascii_uppercase()) {
            return None;
        }
        Some(MethodCall {
            type_name: owner,
            separator: "::",
            method: segments[segments.len() - 1],
        })
    }
}

/// Index of the `>` closing the `<` at the start of `s`.
fn matching_angle(s: &str) -> Option<usize> {
    let mut depth = 0usize;
    for (i, c) in s.char_indices() {
        match c {
            '<' => depth += 1,
            '>' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

fn find_top_level(s: &str, needle: &str) -> Option<usize> {
    let mut depth = 0usize;
    for (i, c) in s.char_indices() {
        match c {
            '<' => depth += 1,
            '>' => depth = depth.saturating_sub(1),
            _ if depth == 0 && s[i..].starts_with(needle) => return Some(i),
            _ => {}
        }
    }
    None
}

/// Split a path on `::` outside of generic arguments.
fn split_path(s: &str) -> Vec<&str> {
    let mut segments = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    let bytes = s.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'<' => depth += 1,
            b'>' => depth = depth.saturating_sub(1),
            b':' if depth == 0 && bytes.get(i + 1) == Some(&b':') => {
                segments.push(&s[start..i]);
                start = i + 2;
                i += 1;
            }
            _ => {}
        }
        i += 1;
    }
    segments.push(&s[start..]);
    segments
}

/// `&mut app::repo::Users<T>` -> `Users`
fn short_type_name(ty: &str) -> &str {
    let ty = ty.trim_start_matches('&').trim_start_matches("mut ").trim();
    let ty = match ty.find('<') {
        Some(idx) => &ty[..idx],
        None => ty,
    };
    ty.rsplit("::").next().unwrap_or(ty)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(function: &str, file: &str, line: u32) -> RawFrame {
        RawFrame {
            function: Some(function.to_string()),
            file: Some(PathBuf::from(file)),
            line: Some(line),
        }
    }

    #[test]
    fn test_skips_forwarding_and_lineless_frames() {
        let filter = BacktraceFilter::new().with_base_dir("/app");
        let frames = vec![
            frame("core::ops::function::FnOnce::call_once", "/app/src/main.rs", 1),
            frame(
                "<F as core::future::future::Future>::poll",
                "/app/src/main.rs",
                2,
            ),
            RawFrame {
                function: Some("app::handler".to_string()),
                file: Some(PathBuf::from("/app/src/main.rs")),
                line: None,
            },
            frame("app::handler", "/app/src/main.rs", 42),
        ];

        let kept = filter.filter(frames, 10);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].line, Some(42));
    }

    #[test]
    fn test_own_sources_are_excluded_by_default() {
        let filter = BacktraceFilter::new();
        let own = format!("{}/src/logger.rs", env!("CARGO_MANIFEST_DIR"));
        let frames = vec![
            frame("sea_orm_querylog::logger::QueryLogger::log_query", &own, 10),
            frame("std::io::stdio::print", "/rustc/abc/library/std/src/io/stdio.rs", 5),
            frame("app::run", "/app/src/main.rs", 3),
        ];

        let kept = filter.filter(frames, 10);
        assert_eq!(kept, vec![frame("app::run", "/app/src/main.rs", 3)]);
    }

    #[test]
    fn test_include_dirs_restrict_frames() {
        let mut filter = BacktraceFilter::new().with_base_dir("/app");
        filter.add_include_dir("src/handlers");
        let frames = vec![
            frame("app::db::query", "/app/src/db.rs", 1),
            frame("app::handlers::users", "/app/src/handlers/users.rs", 2),
            RawFrame {
                function: Some("app::anonymous".to_string()),
                file: None,
                line: Some(9),
            },
        ];

        let kept = filter.filter(frames, 10);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].line, Some(2));
        assert_eq!(kept[1].file, None);
    }

    #[test]
    fn test_max_depth_caps_frames() {
        let filter = BacktraceFilter::new().with_base_dir("/app");
        let frames = (1..=20).map(|line| frame("app::work", "/app/src/work.rs", line));
        assert_eq!(filter.filter(frames.clone(), 3).len(), 3);
        assert!(filter.filter(frames, 0).is_empty());
    }

    #[test]
    fn test_describe_frames() {
        let filter = BacktraceFilter::new().with_base_dir("/app");

        assert_eq!(
            filter.describe(&frame("app::handlers::list_users", "/app/src/handlers.rs", 12)),
            "src/handlers.rs:12"
        );
        assert_eq!(
            filter.describe(&frame("app::repo::UserRepo::find", "/app/src/repo.rs", 30)),
            "src/repo.rs:30 UserRepo::find()"
        );
        assert_eq!(
            filter.describe(&frame(
                "<app::repo::PgStore<T> as app::store::Store>::load::{{closure}}",
                "/app/src/repo.rs",
                48
            )),
            "src/repo.rs:48 PgStore.load()"
        );
        assert_eq!(
            filter.describe(&frame("app::main::{{closure}}", "/elsewhere/main.rs", 7)),
            "/elsewhere/main.rs:7"
        );
    }

    #[test]
    fn test_live_capture_respects_limits() {
        let filter = BacktraceFilter::new();
        let frames = filter.capture_raw(4);
        assert!(frames.len() <= 4);
        let own = PathBuf::from(concat!(env!("CARGO_MANIFEST_DIR"), "/src"));
        assert!(frames
            .iter()
            .filter_map(|f| f.file.as_ref())
            .all(|file| !file.starts_with(&own)));
    }
}
