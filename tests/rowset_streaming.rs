//! Streaming rowset parser tests over synthetic chunked byte streams.
//!
//! These drive the incremental path the same way a live response body
//! would: bytes arrive in arbitrary-sized chunks, rows must come out
//! the moment they complete, and errors embedded mid-stream must end
//! the row channel without emitting further rows.

use bytes::Bytes;
use futures_util::stream;
use serde_json::json;
use xmla_link::{stream_rowset, stream_rowset_json, XmlaLinkError};

fn rowset_document(rows: &str) -> String {
    format!(
        concat!(
            "<soap:Envelope xmlns:soap=\"http://schemas.xmlsoap.org/soap/envelope/\">",
            "<soap:Body><ExecuteResponse><return><root>",
            "<xsd:schema xmlns:xsd=\"http://www.w3.org/2001/XMLSchema\" xmlns:sql=\"urn:schemas-microsoft-com:xml-sql\">",
            "<xsd:complexType name=\"row\"><xsd:sequence>",
            "<xsd:element name=\"Product\" type=\"xsd:string\" sql:field=\"Product\"/>",
            "<xsd:element name=\"Amount\" type=\"xsd:double\" sql:field=\"Amount\"/>",
            "<xsd:element name=\"Units\" type=\"xsd:int\" sql:field=\"Units\"/>",
            "</xsd:sequence></xsd:complexType>",
            "</xsd:schema>",
            "{}",
            "</root></return></ExecuteResponse></soap:Body></soap:Envelope>"
        ),
        rows
    )
}

/// Split a document into fixed-size chunks so element boundaries land
/// mid-chunk, exercising the incremental reader.
fn chunked(document: String, chunk_size: usize) -> impl futures_util::Stream<
    Item = std::result::Result<Bytes, std::io::Error>,
> + Unpin {
    let chunks: Vec<_> = document
        .into_bytes()
        .chunks(chunk_size)
        .map(|c| Ok(Bytes::copy_from_slice(c)))
        .collect();
    stream::iter(chunks)
}

#[tokio::test]
async fn streams_rows_from_chunked_bytes() {
    let doc = rowset_document(
        "<row><product>Widget</product><amount>19.99</amount><units>3</units></row>\
         <row><product>Gadget</product><amount>5.5</amount><units>12</units></row>",
    );
    let mut rows = stream_rowset(chunked(doc, 7));

    let first = rows.recv().await.unwrap().unwrap();
    assert_eq!(first.get("Product"), Some(&json!("Widget")));
    assert_eq!(first.get("Amount"), Some(&json!(19.99)));
    assert_eq!(first.get("Units"), Some(&json!(3)));

    let second = rows.recv().await.unwrap().unwrap();
    assert_eq!(second.get("Product"), Some(&json!("Gadget")));

    assert!(rows.recv().await.is_none(), "channel should close at end of stream");
}

#[tokio::test]
async fn all_null_rows_stream_as_empty_rows() {
    let doc = rowset_document(
        "<row><product>Widget</product><amount>19.99</amount><units>3</units></row>\
         <row/>\
         <row><product>Gadget</product><amount>5.5</amount><units>12</units></row>",
    );
    let mut rows = stream_rowset(chunked(doc, 7));

    let first = rows.recv().await.unwrap().unwrap();
    assert_eq!(first.get("Product"), Some(&json!("Widget")));

    let second = rows.recv().await.unwrap().unwrap();
    assert!(second.is_empty(), "all-null row must arrive, and arrive empty");

    let third = rows.recv().await.unwrap().unwrap();
    assert_eq!(third.get("Product"), Some(&json!("Gadget")));

    assert!(rows.recv().await.is_none());
}

#[tokio::test]
async fn empty_rowset_closes_without_rows() {
    let mut rows = stream_rowset(chunked(rowset_document(""), 16));
    assert!(rows.recv().await.is_none());
}

#[tokio::test]
async fn embedded_fault_ends_stream_with_protocol_error() {
    let doc = concat!(
        "<soap:Envelope xmlns:soap=\"http://schemas.xmlsoap.org/soap/envelope/\">",
        "<soap:Body><soap:Fault>",
        "<detail><error description=\"query was cancelled\" errorcode=\"0xC11C0002\"/></detail>",
        "</soap:Fault></soap:Body></soap:Envelope>"
    )
    .to_string();
    let mut rows = stream_rowset(chunked(doc, 11));

    let err = rows.recv().await.unwrap().unwrap_err();
    match err {
        XmlaLinkError::Protocol { description, code } => {
            assert_eq!(description, "query was cancelled");
            assert_eq!(code, "0xC11C0002");
        },
        other => panic!("expected protocol error, got {}", other),
    }
    assert!(rows.recv().await.is_none(), "no rows after the error");
}

#[tokio::test]
async fn truncated_stream_surfaces_a_parse_error() {
    let full = rowset_document("<row><product>Widget</product>");
    // Cut mid-tag so the stream ends inside an unterminated `<product`.
    let cut = full.find("<product>").unwrap() + 4;
    let truncated = full[..cut].to_string();
    let mut rows = stream_rowset(chunked(truncated, 13));

    // Everything up to the truncation point parses; the terminal item
    // must be an error, never a silent clean close.
    let mut saw_error = false;
    while let Some(item) = rows.recv().await {
        if item.is_err() {
            saw_error = true;
        }
    }
    assert!(saw_error);
}

#[tokio::test]
async fn json_line_stream_emits_one_object_per_row() {
    let doc = rowset_document(
        "<row><product>Widget</product><amount>19.99</amount><units>3</units></row>",
    );
    let mut lines = stream_rowset_json(chunked(doc, 9));

    let line = lines.recv().await.unwrap().unwrap();
    let value: serde_json::Value = serde_json::from_str(&line).unwrap();
    assert_eq!(value["Product"], json!("Widget"));
    assert_eq!(value["Amount"], json!(19.99));
    assert_eq!(value["Units"], json!(3));
    assert!(lines.recv().await.is_none());
}

#[tokio::test]
async fn rows_preserve_schema_column_order_in_json() {
    let doc = rowset_document(
        "<row><product>A</product><amount>1.0</amount><units>1</units></row>",
    );
    let mut lines = stream_rowset_json(chunked(doc, 32));
    let line = lines.recv().await.unwrap().unwrap();
    let product = line.find("Product").unwrap();
    let amount = line.find("Amount").unwrap();
    let units = line.find("Units").unwrap();
    assert!(product < amount && amount < units, "line was: {}", line);
}
