//! Streaming rowset parsing.
//!
//! An XMLA response carries an embedded schema fragment (an
//! `xsd:complexType name="row"` declaration) followed by `<row>`
//! elements. The parser reconstructs typed rows from pull events and
//! works in two modes: materialize a complete document into a `Vec`,
//! or walk a live byte stream and push each row downstream the moment
//! its closing tag is seen. The streaming path never holds more than
//! the schema list plus one in-flight row.
//!
//! Parser state is an explicit struct threaded through each event, so
//! concurrent parses never share anything.

use crate::error::{Result, XmlaLinkError};
use crate::models::{ColumnType, Row, SchemaColumn};
use bytes::Bytes;
use futures_util::{Stream, TryStreamExt};
use log::debug;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use tokio::sync::mpsc;
use tokio_util::io::StreamReader;

/// Rows buffered between the parse task and a slow consumer.
const ROW_CHANNEL_CAPACITY: usize = 256;

/// Explicit per-parse state machine driven by tag events.
#[derive(Debug, Default)]
struct RowsetParser {
    /// Inside the `xsd:complexType name="row"` schema declaration.
    in_schema: bool,
    /// Inside a `<row>` data element.
    in_row: bool,
    /// A SOAP fault was seen; the next `<error>` element fails the parse.
    in_error: bool,
    /// Wire name of the column whose text is being read.
    current_column: Option<String>,
    schema: Vec<SchemaColumn>,
    row: Row,
}

impl RowsetParser {
    fn new() -> Self {
        Self::default()
    }

    /// Handle an opening (or empty) tag. Returns an error to
    /// short-circuit the parse on an embedded protocol error, and a
    /// completed row when a self-closing `<row/>` (one whose every
    /// column is null) is seen.
    fn on_open_tag(&mut self, e: &BytesStart<'_>, is_empty: bool) -> Result<Option<Row>> {
        let name = e.local_name();
        let name = name.as_ref();

        if name.eq_ignore_ascii_case(b"fault") {
            self.in_error = true;
            return Ok(None);
        }

        if self.in_error && name.eq_ignore_ascii_case(b"error") {
            return Err(self.extract_error(e));
        }

        if name.eq_ignore_ascii_case(b"complexType") {
            if self.attribute(e, b"name")?.as_deref() == Some("row") {
                self.in_schema = true;
            }
            return Ok(None);
        }

        if self.in_schema && name.eq_ignore_ascii_case(b"element") {
            self.append_schema_column(e)?;
            return Ok(None);
        }

        if !self.in_error && name.eq_ignore_ascii_case(b"row") {
            if is_empty {
                // No close event follows a self-closing row; emit it
                // here so all-null rows are not dropped.
                return Ok(Some(Row::new()));
            }
            self.in_row = true;
            self.row = Row::new();
            return Ok(None);
        }

        if self.in_row && !is_empty {
            let mut column = String::from_utf8_lossy(name).into_owned();
            column.make_ascii_lowercase();
            self.current_column = Some(column);
        }
        Ok(None)
    }

    /// Handle element text: coerce per the current column's declared
    /// type and store under its friendly name.
    fn on_text(&mut self, text: &str) -> Result<()> {
        if !self.in_row || self.in_error {
            return Ok(());
        }
        let Some(wire_name) = self.current_column.as_deref() else {
            return Ok(());
        };

        // Schema elements always precede row data; a row value naming
        // an undeclared column is a protocol-format violation.
        let column = self
            .schema
            .iter()
            .find(|c| c.wire_name == wire_name)
            .ok_or_else(|| XmlaLinkError::Protocol {
                description: format!("row value for undeclared column '{}'", wire_name),
                code: "schema".to_string(),
            })?;

        let value = column.data_type.coerce(text, &column.friendly_name)?;
        self.row.push(column.friendly_name.clone(), value);
        Ok(())
    }

    /// Handle a closing tag. Returns the completed row when a `<row>`
    /// element closes.
    fn on_close_tag(&mut self, name: &[u8]) -> Option<Row> {
        if self.in_schema && name.eq_ignore_ascii_case(b"complexType") {
            self.in_schema = false;
            debug!("[ROWSET] Schema complete: {} column(s)", self.schema.len());
            return None;
        }
        if self.in_row && name.eq_ignore_ascii_case(b"row") {
            self.in_row = false;
            self.current_column = None;
            return Some(std::mem::take(&mut self.row));
        }
        if self.in_row {
            self.current_column = None;
        }
        None
    }

    fn append_schema_column(&mut self, e: &BytesStart<'_>) -> Result<()> {
        let mut name: Option<String> = None;
        let mut type_name: Option<String> = None;
        let mut field: Option<String> = None;

        for a in e.attributes().with_checks(false) {
            let a = a?;
            match a.key.as_ref() {
                b"name" => name = Some(a.unescape_value()?.into_owned()),
                b"type" => type_name = Some(a.unescape_value()?.into_owned()),
                b"sql:field" => field = Some(a.unescape_value()?.into_owned()),
                _ => {},
            }
        }

        if let (Some(name), Some(field)) = (name, field) {
            let data_type = type_name
                .as_deref()
                .map(ColumnType::from_wire)
                .unwrap_or(ColumnType::Text);
            self.schema.push(SchemaColumn {
                friendly_name: field,
                wire_name: name.to_ascii_lowercase(),
                data_type,
            });
        }
        Ok(())
    }

    fn extract_error(&self, e: &BytesStart<'_>) -> XmlaLinkError {
        let mut description = String::from("unknown server error");
        let mut code = String::from("unknown");
        for a in e.attributes().with_checks(false) {
            let Ok(a) = a else { continue };
            match a.key.as_ref() {
                b"description" => {
                    if let Ok(v) = a.unescape_value() {
                        description = v.into_owned();
                    }
                },
                b"errorcode" => {
                    if let Ok(v) = a.unescape_value() {
                        code = v.into_owned();
                    }
                },
                _ => {},
            }
        }
        XmlaLinkError::Protocol { description, code }
    }

    fn attribute(&self, e: &BytesStart<'_>, key: &[u8]) -> Result<Option<String>> {
        for a in e.attributes().with_checks(false) {
            let a = a?;
            if a.key.as_ref() == key {
                return Ok(Some(a.unescape_value()?.into_owned()));
            }
        }
        Ok(None)
    }
}

/// Parse a complete response document into a materialized row list.
pub fn parse_rowset(xml: &str) -> Result<Vec<Row>> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut parser = RowsetParser::new();
    let mut rows = Vec::new();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => {
                if let Some(row) = parser.on_open_tag(&e, false)? {
                    rows.push(row);
                }
            },
            Event::Empty(e) => {
                if let Some(row) = parser.on_open_tag(&e, true)? {
                    rows.push(row);
                }
            },
            Event::Text(e) => parser.on_text(&e.unescape()?)?,
            Event::End(e) => {
                if let Some(row) = parser.on_close_tag(e.local_name().as_ref()) {
                    rows.push(row);
                }
            },
            Event::Eof => break,
            _ => {},
        }
        buf.clear();
    }
    Ok(rows)
}

/// Parse a live byte stream, pushing each row the moment it completes.
///
/// The parse runs on a spawned task; rows (or the terminal error)
/// arrive on the returned channel, which closes at end of stream. When
/// the receiver is dropped or an error occurs, the task stops reading
/// and drops the source, cancelling the upstream transfer instead of
/// buffering data that would be discarded.
pub fn stream_rowset<S, E>(byte_stream: S) -> mpsc::Receiver<Result<Row>>
where
    S: Stream<Item = std::result::Result<Bytes, E>> + Send + 'static,
    E: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let (tx, rx) = mpsc::channel(ROW_CHANNEL_CAPACITY);

    tokio::spawn(async move {
        let io_stream = Box::pin(byte_stream.map_err(std::io::Error::other));
        let mut reader = Reader::from_reader(StreamReader::new(io_stream));
        reader.config_mut().trim_text(true);

        let mut parser = RowsetParser::new();
        let mut buf = Vec::new();
        let mut emitted: u64 = 0;

        loop {
            let event = match reader.read_event_into_async(&mut buf).await {
                Ok(event) => event,
                Err(e) => {
                    let _ = tx.send(Err(e.into())).await;
                    return;
                },
            };

            let step = match event {
                Event::Start(e) => match parser.on_open_tag(&e, false) {
                    Ok(None) => Ok(()),
                    Ok(Some(row)) => {
                        emitted += 1;
                        if tx.send(Ok(row)).await.is_err() {
                            // Receiver gone: stop reading the source.
                            return;
                        }
                        Ok(())
                    },
                    Err(e) => Err(e),
                },
                Event::Empty(e) => match parser.on_open_tag(&e, true) {
                    Ok(None) => Ok(()),
                    Ok(Some(row)) => {
                        emitted += 1;
                        if tx.send(Ok(row)).await.is_err() {
                            return;
                        }
                        Ok(())
                    },
                    Err(e) => Err(e),
                },
                Event::Text(e) => match e.unescape() {
                    Ok(text) => parser.on_text(&text),
                    Err(e) => Err(e.into()),
                },
                Event::End(e) => {
                    if let Some(row) = parser.on_close_tag(e.local_name().as_ref()) {
                        emitted += 1;
                        if tx.send(Ok(row)).await.is_err() {
                            return;
                        }
                    }
                    Ok(())
                },
                Event::Eof => {
                    debug!("[ROWSET] Stream complete: {} row(s)", emitted);
                    return;
                },
                _ => Ok(()),
            };

            if let Err(e) = step {
                let _ = tx.send(Err(e)).await;
                return;
            }
            buf.clear();
        }
    });

    rx
}

/// Like [`stream_rowset`], but yields JSON-encoded row lines for
/// downstream formatters that speak line-delimited JSON.
pub fn stream_rowset_json<S, E>(byte_stream: S) -> mpsc::Receiver<Result<String>>
where
    S: Stream<Item = std::result::Result<Bytes, E>> + Send + 'static,
    E: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let (tx, rx) = mpsc::channel(ROW_CHANNEL_CAPACITY);
    let mut rows = stream_rowset(byte_stream);

    tokio::spawn(async move {
        while let Some(next) = rows.recv().await {
            let line = next.and_then(|row| row.to_json_line());
            if tx.send(line).await.is_err() {
                return;
            }
        }
    });

    rx
}
