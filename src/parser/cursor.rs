//! Streaming cursor over a report document.
//!
//! Thin wrapper around a pull-based XML reader that yields element open/close
//! events with 1-based line numbers, so every validation error can cite the
//! offending line. Forward-only, single pass, no DOM.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use super::error::ReportError;

pub(crate) struct ReportCursor<'a> {
    reader: Reader<&'a [u8]>,
    text: &'a [u8],
    buf: Vec<u8>,
    /// Byte offset the line counter has been advanced to.
    pos: usize,
    line: u32,
}

/// An element start event, with its attributes already decoded.
#[derive(Debug, Clone)]
pub(crate) struct Element {
    pub name: String,
    pub line: u32,
    pub self_closing: bool,
    attrs: Vec<(String, String)>,
}

impl Element {
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }
}

#[derive(Debug)]
pub(crate) enum Node {
    Open(Element),
    Close(String),
    Eof,
}

enum Raw {
    Open {
        name: String,
        attrs: Result<Vec<(String, String)>, String>,
        self_closing: bool,
    },
    Close(String),
    Text(String),
    Skip,
    Eof,
    Err(String),
}

impl<'a> ReportCursor<'a> {
    pub fn new(text: &'a str) -> Self {
        let mut reader = Reader::from_str(text);
        reader.trim_text(true);
        ReportCursor {
            reader,
            text: text.as_bytes(),
            buf: Vec::new(),
            pos: 0,
            line: 1,
        }
    }

    /// Next element open or close event. Text, comments and declarations are
    /// passed over; invalid XML surfaces as `MalformedDocument`.
    pub fn next_node(&mut self) -> Result<Node, ReportError> {
        loop {
            let raw = self.next_raw();
            let line = self.advance_line();
            match raw {
                Raw::Open {
                    name,
                    attrs,
                    self_closing,
                } => {
                    let attrs = attrs.map_err(|message| self.malformed(message))?;
                    return Ok(Node::Open(Element {
                        name,
                        line,
                        self_closing,
                        attrs,
                    }));
                }
                Raw::Close(name) => return Ok(Node::Close(name)),
                Raw::Eof => return Ok(Node::Eof),
                Raw::Err(message) => return Err(self.malformed(message)),
                Raw::Text(_) | Raw::Skip => {}
            }
        }
    }

    /// Consumes everything up to and including the close tag of the element
    /// whose open event was just returned.
    pub fn skip_subtree(&mut self) -> Result<(), ReportError> {
        self.consume_subtree(false).map(|_| ())
    }

    /// Like `skip_subtree`, but concatenates all descendant text and CDATA
    /// verbatim. Used to capture stack traces.
    pub fn collect_text(&mut self) -> Result<String, ReportError> {
        self.consume_subtree(true)
    }

    fn consume_subtree(&mut self, collect: bool) -> Result<String, ReportError> {
        let mut depth = 0u32;
        let mut out = String::new();
        loop {
            let raw = self.next_raw();
            self.advance_line();
            match raw {
                Raw::Open {
                    attrs,
                    self_closing,
                    ..
                } => {
                    attrs.map_err(|message| self.malformed(message))?;
                    if !self_closing {
                        depth += 1;
                    }
                }
                Raw::Close(_) => {
                    if depth == 0 {
                        return Ok(out);
                    }
                    depth -= 1;
                }
                Raw::Text(text) => {
                    if collect {
                        out.push_str(&text);
                    }
                }
                Raw::Skip => {}
                Raw::Eof => {
                    return Err(self.malformed("unexpected end of document".to_string()))
                }
                Raw::Err(message) => return Err(self.malformed(message)),
            }
        }
    }

    fn next_raw(&mut self) -> Raw {
        self.buf.clear();
        match self.reader.read_event_into(&mut self.buf) {
            Err(e) => Raw::Err(e.to_string()),
            Ok(Event::Start(ref e)) => read_tag(e, false),
            Ok(Event::Empty(ref e)) => read_tag(e, true),
            Ok(Event::End(ref e)) => {
                Raw::Close(String::from_utf8_lossy(e.name().as_ref()).into_owned())
            }
            Ok(Event::Text(ref e)) => match e.unescape() {
                Ok(text) => Raw::Text(text.into_owned()),
                Err(e) => Raw::Err(e.to_string()),
            },
            Ok(Event::CData(e)) => {
                Raw::Text(String::from_utf8_lossy(&e.into_inner()).into_owned())
            }
            Ok(Event::Eof) => Raw::Eof,
            Ok(_) => Raw::Skip,
        }
    }

    /// Advances the line counter to the reader's current position and returns
    /// the 1-based line number there.
    fn advance_line(&mut self) -> u32 {
        let end = self.reader.buffer_position().min(self.text.len());
        let newlines = self.text[self.pos..end]
            .iter()
            .filter(|&&b| b == b'\n')
            .count();
        self.pos = end;
        self.line += newlines as u32;
        self.line
    }

    fn malformed(&self, message: String) -> ReportError {
        ReportError::MalformedDocument {
            position: self.pos,
            message,
        }
    }
}

fn read_tag(start: &BytesStart, self_closing: bool) -> Raw {
    let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
    let mut attrs = Vec::new();
    for attr in start.attributes() {
        let attr = match attr {
            Ok(attr) => attr,
            Err(e) => {
                return Raw::Open {
                    name,
                    attrs: Err(e.to_string()),
                    self_closing,
                }
            }
        };
        let value = match attr.unescape_value() {
            Ok(value) => value.into_owned(),
            Err(e) => {
                return Raw::Open {
                    name,
                    attrs: Err(e.to_string()),
                    self_closing,
                }
            }
        };
        attrs.push((
            String::from_utf8_lossy(attr.key.as_ref()).into_owned(),
            value,
        ));
    }
    Raw::Open {
        name,
        attrs: Ok(attrs),
        self_closing,
    }
}
