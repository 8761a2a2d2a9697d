//! Format detection and dispatch.
//!
//! Every format implements [`FormatHandler`]: a pure [`probe`](FormatHandler::probe)
//! over a byte prefix answering [`Probe::Yes`], [`Probe::No`] or
//! [`Probe::NeedMore`], and an [`open`](FormatHandler::open) that parses
//! the whole input. [`FormatRegistry::open`] reads a growing prefix, asks
//! every handler, and commits to the first one that says yes and opens
//! successfully.

use std::io::SeekFrom;
use std::sync::Arc;

use crate::codec::DecoderRegistry;
use crate::format::locator::{ReadSeek, StreamSource};
use crate::format::reader::read_up_to;
use crate::format::{ArchiveInfo, FormatKind};
use crate::item::Item;
use crate::read::OpenOptions;
use crate::{Error, Result};

/// Size of the first prefix handed to the probes.
pub const INITIAL_PROBE_SIZE: usize = 4096;

/// Answer of a format probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Probe {
    /// The prefix is this format.
    Yes,
    /// The prefix is not this format.
    No,
    /// The prefix is too short to decide.
    NeedMore,
}

/// Everything a handler may consult while opening.
pub struct OpenContext<'a> {
    /// Caller options.
    pub options: &'a OpenOptions,
    /// Decode transforms.
    pub decoders: &'a Arc<DecoderRegistry>,
    /// File name of the input, if known.
    pub name_hint: Option<&'a str>,
    /// Total length of the input.
    pub source_len: u64,
}

/// Result of a successful open.
pub struct Opened {
    /// Items in archive order.
    pub items: Vec<Item>,
    /// Archive-level metadata.
    pub info: ArchiveInfo,
    /// Payload resolver for the items.
    pub source: Box<dyn StreamSource>,
}

impl std::fmt::Debug for Opened {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Opened")
            .field("items", &self.items.len())
            .field("info", &self.info)
            .finish_non_exhaustive()
    }
}

/// One supported container format.
pub trait FormatHandler: Send + Sync {
    /// The format this handler opens.
    fn kind(&self) -> FormatKind;

    /// Lower-case extensions that make this handler a preferred candidate.
    fn extensions(&self) -> &'static [&'static str];

    /// Largest prefix the probe may ask for.
    fn probe_limit(&self) -> usize {
        INITIAL_PROBE_SIZE
    }

    /// Decides from `prefix` alone. Must not assume more bytes exist.
    fn probe(&self, prefix: &[u8]) -> Probe;

    /// Returns true if the file name alone selects this handler.
    fn accepts_name(&self, name: &str) -> bool {
        let _ = name;
        false
    }

    /// Parses the input, positioned anywhere.
    fn open(&self, reader: &mut dyn ReadSeek, ctx: &OpenContext<'_>) -> Result<Opened>;
}

/// The set of formats considered when opening an input.
#[derive(Clone)]
pub struct FormatRegistry {
    handlers: Vec<Arc<dyn FormatHandler>>,
    decoders: Arc<DecoderRegistry>,
}

impl std::fmt::Debug for FormatRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FormatRegistry")
            .field(
                "handlers",
                &self.handlers.iter().map(|h| h.kind()).collect::<Vec<_>>(),
            )
            .field("decoders", &self.decoders)
            .finish()
    }
}

impl Default for FormatRegistry {
    fn default() -> Self {
        use crate::formats;
        let mut registry = Self::empty(DecoderRegistry::default());
        registry.register(formats::ntfs::NtfsHandler);
        registry.register(formats::fat::FatHandler);
        registry.register(formats::nsis::NsisHandler);
        registry.register(formats::flv::FlvHandler);
        registry.register(formats::lzh::LzhHandler);
        registry.register(formats::ihex::IhexHandler);
        registry.register(formats::hashfile::HashFileHandler);
        registry.register(formats::split::SplitHandler);
        registry
    }
}

fn extension_of(name: &str) -> Option<String> {
    let file = name.rsplit(['/', '\\']).next().unwrap_or(name);
    match file.rfind('.') {
        Some(0) | None => None,
        Some(pos) => Some(file[pos + 1..].to_ascii_lowercase()),
    }
}

impl FormatRegistry {
    /// A registry without handlers.
    pub fn empty(decoders: DecoderRegistry) -> Self {
        Self {
            handlers: Vec::new(),
            decoders: Arc::new(decoders),
        }
    }

    /// Replaces the decode transforms.
    pub fn with_decoders(mut self, decoders: DecoderRegistry) -> Self {
        self.decoders = Arc::new(decoders);
        self
    }

    /// Appends a handler; earlier handlers win ties.
    pub fn register(&mut self, handler: impl FormatHandler + 'static) {
        self.handlers.push(Arc::new(handler));
    }

    /// Registered handlers in probe order.
    pub fn handlers(&self) -> impl Iterator<Item = &dyn FormatHandler> {
        self.handlers.iter().map(|h| h.as_ref())
    }

    /// The decode transforms.
    pub fn decoders(&self) -> &Arc<DecoderRegistry> {
        &self.decoders
    }

    /// The handler for `kind`, if registered.
    pub fn handler(&self, kind: FormatKind) -> Option<&dyn FormatHandler> {
        self.handlers().find(|h| h.kind() == kind)
    }

    /// First handler whose probe answers yes for `prefix`.
    pub fn detect(&self, prefix: &[u8]) -> Option<&dyn FormatHandler> {
        self.handlers().find(|h| h.probe(prefix) == Probe::Yes)
    }

    /// Handlers listing the extension of `name`.
    pub fn by_extension(&self, name: &str) -> Vec<&dyn FormatHandler> {
        let Some(ext) = extension_of(name) else {
            return Vec::new();
        };
        self.handlers()
            .filter(|h| h.extensions().contains(&ext.as_str()))
            .collect()
    }

    fn candidate_order(&self, name_hint: Option<&str>) -> Vec<usize> {
        let ext = name_hint.and_then(extension_of);
        let mut order: Vec<usize> = (0..self.handlers.len()).collect();
        if let Some(ext) = ext {
            order.sort_by_key(|&i| !self.handlers[i].extensions().contains(&ext.as_str()));
        }
        order
    }

    /// Detects the format of `reader` and opens it.
    ///
    /// # Errors
    ///
    /// [`Error::NotAnArchive`] if no handler accepts the input. Errors that
    /// are not recoverable (I/O, resource limits) are returned immediately.
    pub fn open(
        &self,
        reader: &mut dyn ReadSeek,
        name_hint: Option<&str>,
        options: &OpenOptions,
    ) -> Result<(FormatKind, Opened)> {
        let source_len = reader.seek(SeekFrom::End(0))?;
        let ctx = OpenContext {
            options,
            decoders: &self.decoders,
            name_hint,
            source_len,
        };
        let order = self.candidate_order(name_hint);
        let mut tried = vec![false; self.handlers.len()];
        let mut last_error = None;

        if let Some(name) = name_hint {
            for &i in &order {
                let handler = &self.handlers[i];
                if handler.accepts_name(name) {
                    tried[i] = true;
                    reader.seek(SeekFrom::Start(0))?;
                    match handler.open(reader, &ctx) {
                        Ok(opened) => return Ok((handler.kind(), opened)),
                        Err(e) if e.is_recoverable() => last_error = Some(e),
                        Err(e) => return Err(e),
                    }
                }
            }
        }

        let max_limit = self.handlers.iter().map(|h| h.probe_limit()).max();
        let max_limit = max_limit.unwrap_or(INITIAL_PROBE_SIZE);
        let mut want = INITIAL_PROBE_SIZE.min(max_limit);
        loop {
            reader.seek(SeekFrom::Start(0))?;
            let mut prefix = vec![0u8; want];
            let got = read_up_to(reader, &mut prefix)?;
            prefix.truncate(got);
            let at_eof = got < want;

            let mut pending = false;
            for &i in &order {
                if tried[i] {
                    continue;
                }
                let handler = &self.handlers[i];
                let limit = handler.probe_limit().min(prefix.len());
                match handler.probe(&prefix[..limit]) {
                    Probe::Yes => {
                        tried[i] = true;
                        log::debug!("probe accepted {}", handler.kind());
                        reader.seek(SeekFrom::Start(0))?;
                        match handler.open(reader, &ctx) {
                            Ok(opened) => return Ok((handler.kind(), opened)),
                            Err(e) if e.is_recoverable() => {
                                log::debug!("{} rejected input: {}", handler.kind(), e);
                                last_error = Some(e);
                            }
                            Err(e) => return Err(e),
                        }
                    }
                    Probe::NeedMore if !at_eof && limit < handler.probe_limit() => pending = true,
                    Probe::NeedMore | Probe::No => {}
                }
            }
            if !pending || at_eof || want >= max_limit {
                break;
            }
            want = (want * 2).min(max_limit);
        }

        Err(match last_error {
            Some(Error::NotAnArchive(msg)) => Error::NotAnArchive(msg),
            Some(e) => Error::not_an_archive(e.to_string()),
            None => Error::not_an_archive("no format recognised the input"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::locator::{DataLocator, PlainSource};
    use crate::ItemPath;
    use std::io::Cursor;

    struct Magic {
        kind: FormatKind,
        magic: &'static [u8],
        limit: usize,
        fail_open: bool,
    }

    impl FormatHandler for Magic {
        fn kind(&self) -> FormatKind {
            self.kind
        }

        fn extensions(&self) -> &'static [&'static str] {
            &["mg"]
        }

        fn probe_limit(&self) -> usize {
            self.limit
        }

        fn probe(&self, prefix: &[u8]) -> Probe {
            if prefix.len() < self.magic.len() {
                return Probe::NeedMore;
            }
            if prefix.ends_with(self.magic) || prefix.starts_with(self.magic) {
                Probe::Yes
            } else if prefix.len() < self.limit {
                Probe::NeedMore
            } else {
                Probe::No
            }
        }

        fn open(&self, _reader: &mut dyn ReadSeek, _ctx: &OpenContext<'_>) -> Result<Opened> {
            if self.fail_open {
                return Err(Error::not_an_archive("declined"));
            }
            let mut info = ArchiveInfo::new(self.kind);
            info.item_count = 1;
            Ok(Opened {
                items: vec![Item::file(ItemPath::from("x"), 0, DataLocator::Empty)],
                info,
                source: Box::new(PlainSource),
            })
        }
    }

    #[test]
    fn test_first_yes_wins_and_declines_fall_through() {
        let mut registry = FormatRegistry::empty(DecoderRegistry::default());
        registry.register(Magic { kind: FormatKind::Lzh, magic: b"AB", limit: 16, fail_open: true });
        registry.register(Magic { kind: FormatKind::Flv, magic: b"AB", limit: 16, fail_open: false });
        let mut src = Cursor::new(b"ABCD".to_vec());
        let (kind, opened) = registry.open(&mut src, None, &OpenOptions::default()).unwrap();
        assert_eq!(kind, FormatKind::Flv);
        assert_eq!(opened.items.len(), 1);
    }

    #[test]
    fn test_need_more_grows_prefix() {
        let mut registry = FormatRegistry::empty(DecoderRegistry::default());
        registry.register(Magic {
            kind: FormatKind::Nsis,
            magic: b"SIG!",
            limit: 3 * INITIAL_PROBE_SIZE,
            fail_open: false,
        });
        let mut data = vec![0u8; 2 * INITIAL_PROBE_SIZE];
        data.extend_from_slice(b"SIG!");
        let mut src = Cursor::new(data);
        let (kind, _) = registry.open(&mut src, None, &OpenOptions::default()).unwrap();
        assert_eq!(kind, FormatKind::Nsis);
    }

    #[test]
    fn test_nothing_matches() {
        let registry = FormatRegistry::default();
        let mut src = Cursor::new(vec![0x42u8; 100]);
        let err = registry.open(&mut src, None, &OpenOptions::default()).unwrap_err();
        assert!(matches!(err, Error::NotAnArchive(_)));
    }

    #[test]
    fn test_extension_lookup() {
        let registry = FormatRegistry::default();
        let kinds: Vec<_> = registry.by_extension("dump.LZH").iter().map(|h| h.kind()).collect();
        assert_eq!(kinds, vec![FormatKind::Lzh]);
        assert!(registry.by_extension("noext").is_empty());
        assert!(registry.handler(FormatKind::Ntfs).is_some());
        assert_eq!(extension_of("dir.d/file"), None);
    }
}
