//! SOAP envelope construction for XMLA requests.
//!
//! Pure, stateless string builders for the three envelope kinds a
//! session needs: begin, command-with-session and end. Queries are
//! classified three ways (Discover, Statement, Command) by a small
//! heuristic on the leading tokens.

use quick_xml::escape::escape;

const SOAP_NS: &str = "http://schemas.xmlsoap.org/soap/envelope/";
const XMLA_NS: &str = "urn:schemas-microsoft-com:xml-analysis";
const ENGINE_NS: &str = "http://schemas.microsoft.com/analysisservices/2003/engine/2";

/// Three-way classification of a query payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryType {
    /// A full `<Discover>` request, passed through verbatim.
    Discover,
    /// A raw DAX/MDX statement, wrapped in `<Statement>`.
    Statement,
    /// A pre-built command XML fragment, embedded inside `<Command>`.
    Command,
}

impl QueryType {
    /// Classify a query by its leading tokens. Compared as bytes so
    /// multibyte element names never land on a char boundary.
    pub fn classify(query: &str) -> QueryType {
        let trimmed = query.trim_start().as_bytes();
        if trimmed.len() >= 9 && trimmed[..9].eq_ignore_ascii_case(b"<discover") {
            QueryType::Discover
        } else if trimmed.first() == Some(&b'<') {
            QueryType::Command
        } else {
            QueryType::Statement
        }
    }
}

fn header(session_fragment: &str, request_id: &str) -> String {
    format!(
        concat!(
            "<soap:Header>",
            "{session}",
            "<ActivityID xmlns=\"{engine_ns}\">{request_id}</ActivityID>",
            "</soap:Header>"
        ),
        session = session_fragment,
        engine_ns = ENGINE_NS,
        request_id = request_id,
    )
}

fn envelope(header: &str, body: &str) -> String {
    format!(
        "<soap:Envelope xmlns:soap=\"{}\">{}{}</soap:Envelope>",
        SOAP_NS, header, body
    )
}

fn execute_body(command_fragment: &str, locale: &str) -> String {
    format!(
        concat!(
            "<soap:Body>",
            "<Execute xmlns=\"{xmla_ns}\">",
            "{command}",
            "<Properties><PropertyList>",
            "<LocaleIdentifier>{locale}</LocaleIdentifier>",
            "<Content>SchemaData</Content>",
            "<Format>Tabular</Format>",
            "</PropertyList></Properties>",
            "</Execute>",
            "</soap:Body>"
        ),
        xmla_ns = XMLA_NS,
        command = command_fragment,
        locale = locale,
    )
}

/// Envelope that opens a new server-side session.
pub fn begin_session(request_id: &str, locale: &str) -> String {
    let session = format!(
        "<BeginSession soap:mustUnderstand=\"1\" xmlns=\"{}\"/>",
        XMLA_NS
    );
    envelope(
        &header(&session, request_id),
        &execute_body("<Command><Statement/></Command>", locale),
    )
}

/// Envelope that executes a query inside an existing session.
///
/// The query is embedded per its [`QueryType`]: Discover requests
/// replace the whole `Execute` body, statements are XML-escaped and
/// wrapped, command fragments are embedded verbatim.
pub fn command_with_session(
    session_id: &str,
    request_id: &str,
    locale: &str,
    query: &str,
) -> String {
    let session = format!(
        "<Session soap:mustUnderstand=\"1\" SessionId=\"{}\" xmlns=\"{}\"/>",
        escape(session_id),
        XMLA_NS
    );
    let head = header(&session, request_id);

    match QueryType::classify(query) {
        QueryType::Discover => {
            envelope(&head, &format!("<soap:Body>{}</soap:Body>", query))
        },
        QueryType::Statement => {
            let command = format!("<Command><Statement>{}</Statement></Command>", escape(query));
            envelope(&head, &execute_body(&command, locale))
        },
        QueryType::Command => {
            let command = format!("<Command>{}</Command>", query);
            envelope(&head, &execute_body(&command, locale))
        },
    }
}

/// Envelope that tears down a server-side session.
pub fn end_session(session_id: &str, request_id: &str, locale: &str) -> String {
    let session = format!(
        "<EndSession soap:mustUnderstand=\"1\" SessionId=\"{}\" xmlns=\"{}\"/>",
        escape(session_id),
        XMLA_NS
    );
    envelope(
        &header(&session, request_id),
        &execute_body("<Command><Statement/></Command>", locale),
    )
}
