// XML-RPC encoding
//
// Legacy wire format for hosts that predate JSON-RPC: `POST {base}/` with a
// `methodCall` document. XAPI wraps every result in a
// `{Status, Value | ErrorDescription}` struct, which is unwrapped here so
// callers see the same `RpcResult` as with JSON-RPC.
//
// Values map onto `serde_json::Value`. Untyped `<value>` content is a string;
// 64-bit integers travel as strings in both directions.

use std::fmt::Write as _;

use quick_xml::Reader;
use quick_xml::escape::escape;
use quick_xml::events::{BytesStart, Event};
use serde_json::{Map, Number, Value};

use crate::error::Error;
use crate::message::{RpcRequest, RpcResult};

/// Path of the XML-RPC endpoint, relative to the host root.
pub const PATH: &str = "";

pub const CONTENT_TYPE: &str = "text/xml";

const DECLARATION: &str = r#"<?xml version="1.0"?>"#;

// ── Encoding ─────────────────────────────────────────────────────────

pub fn encode_request(request: &RpcRequest) -> String {
    let mut xml = String::from(DECLARATION);
    xml.push_str("<methodCall><methodName>");
    xml.push_str(&escape(request.method.as_str()));
    xml.push_str("</methodName><params>");
    for param in &request.params {
        xml.push_str("<param>");
        write_value(&mut xml, param);
        xml.push_str("</param>");
    }
    xml.push_str("</params></methodCall>");
    xml
}

/// Encode a response the way XAPI does.
///
/// `ErrorDescription`-shaped faults (string arrays) use the XAPI envelope;
/// any other fault payload becomes a classic `<fault>`.
pub fn encode_response(result: &RpcResult) -> String {
    let mut xml = String::from(DECLARATION);
    xml.push_str("<methodResponse>");
    match result {
        RpcResult::Success(value) => {
            let envelope = serde_json::json!({ "Status": "Success", "Value": value });
            xml.push_str("<params><param>");
            write_value(&mut xml, &envelope);
            xml.push_str("</param></params>");
        }
        RpcResult::Fault(payload @ Value::Array(_)) => {
            let envelope = serde_json::json!({ "Status": "Failure", "ErrorDescription": payload });
            xml.push_str("<params><param>");
            write_value(&mut xml, &envelope);
            xml.push_str("</param></params>");
        }
        RpcResult::Fault(payload) => {
            xml.push_str("<fault>");
            write_value(&mut xml, payload);
            xml.push_str("</fault>");
        }
    }
    xml.push_str("</methodResponse>");
    xml
}

fn write_value(xml: &mut String, value: &Value) {
    xml.push_str("<value>");
    match value {
        Value::Null => xml.push_str("<nil/>"),
        Value::Bool(b) => {
            let _ = write!(xml, "<boolean>{}</boolean>", u8::from(*b));
        }
        Value::Number(n) => write_number(xml, n),
        Value::String(s) => {
            let _ = write!(xml, "<string>{}</string>", escape(s.as_str()));
        }
        Value::Array(items) => {
            xml.push_str("<array><data>");
            for item in items {
                write_value(xml, item);
            }
            xml.push_str("</data></array>");
        }
        Value::Object(map) => {
            xml.push_str("<struct>");
            for (name, member) in map {
                let _ = write!(xml, "<member><name>{}</name>", escape(name.as_str()));
                write_value(xml, member);
                xml.push_str("</member>");
            }
            xml.push_str("</struct>");
        }
    }
    xml.push_str("</value>");
}

fn write_number(xml: &mut String, n: &Number) {
    if let Some(i) = n.as_i64() {
        if i32::try_from(i).is_ok() {
            let _ = write!(xml, "<int>{i}</int>");
        } else {
            let _ = write!(xml, "<string>{i}</string>");
        }
    } else if let Some(u) = n.as_u64() {
        let _ = write!(xml, "<string>{u}</string>");
    } else if let Some(f) = n.as_f64() {
        let _ = write!(xml, "<double>{f}</double>");
    }
}

// ── Decoding ─────────────────────────────────────────────────────────

pub fn decode_request(body: &str) -> Result<RpcRequest, Error> {
    let tokens = tokenize(body)?;
    let mut p = Parser::new(&tokens, body);

    p.open("methodCall")?;
    p.open("methodName")?;
    let method = p.text();
    p.close("methodName")?;

    let mut params = Vec::new();
    if p.peek_open().as_deref() == Some("params") {
        p.open("params")?;
        while p.peek_open().as_deref() == Some("param") {
            p.open("param")?;
            params.push(p.value()?);
            p.close("param")?;
        }
        p.close("params")?;
    }
    p.close("methodCall")?;

    Ok(RpcRequest::new(method.trim(), params))
}

pub fn decode_response(body: &str) -> Result<RpcResult, Error> {
    let tokens = tokenize(body)?;
    let mut p = Parser::new(&tokens, body);

    p.open("methodResponse")?;
    let result = match p.peek_open().as_deref() {
        Some("params") => {
            p.open("params")?;
            p.open("param")?;
            let value = p.value()?;
            p.close("param")?;
            p.close("params")?;
            unwrap_envelope(value)
        }
        Some("fault") => {
            p.open("fault")?;
            let value = p.value()?;
            p.close("fault")?;
            RpcResult::Fault(value)
        }
        other => return Err(p.unexpected(&format!("expected <params> or <fault>, found {other:?}"))),
    };
    p.close("methodResponse")?;

    Ok(result)
}

/// Strip XAPI's `{Status, Value}` wrapper. Plain XML-RPC results pass through.
fn unwrap_envelope(value: Value) -> RpcResult {
    let Value::Object(mut map) = value else {
        return RpcResult::Success(value);
    };
    match map.get("Status").and_then(Value::as_str) {
        Some("Success") => RpcResult::Success(map.remove("Value").unwrap_or(Value::Null)),
        Some("Failure") => {
            RpcResult::Fault(map.remove("ErrorDescription").unwrap_or(Value::Null))
        }
        _ => RpcResult::Success(Value::Object(map)),
    }
}

// ── Tokenizer ────────────────────────────────────────────────────────

#[derive(Debug, PartialEq)]
enum Token {
    Open(String),
    Close(String),
    Text(String),
}

fn tokenize(body: &str) -> Result<Vec<Token>, Error> {
    let malformed = |e: quick_xml::Error| Error::Deserialization {
        message: format!("malformed XML: {e}"),
        body: body.to_owned(),
    };

    let mut reader = Reader::from_str(body);
    let mut tokens = Vec::new();

    loop {
        match reader.read_event().map_err(malformed)? {
            Event::Start(tag) => tokens.push(Token::Open(tag_name(&tag))),
            Event::End(tag) => tokens.push(Token::Close(
                String::from_utf8_lossy(tag.name().as_ref()).into_owned(),
            )),
            Event::Empty(tag) => {
                let name = tag_name(&tag);
                tokens.push(Token::Open(name.clone()));
                tokens.push(Token::Close(name));
            }
            Event::Text(text) => {
                let text = text.unescape().map_err(malformed)?;
                push_text(&mut tokens, &text);
            }
            Event::CData(data) => {
                push_text(&mut tokens, &String::from_utf8_lossy(&data.into_inner()));
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(tokens)
}

fn tag_name(tag: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(tag.name().as_ref()).into_owned()
}

fn push_text(tokens: &mut Vec<Token>, text: &str) {
    if let Some(Token::Text(prev)) = tokens.last_mut() {
        prev.push_str(text);
    } else {
        tokens.push(Token::Text(text.to_owned()));
    }
}

// ── Parser ───────────────────────────────────────────────────────────

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
    body: &'a str,
}

impl<'a> Parser<'a> {
    fn new(tokens: &'a [Token], body: &'a str) -> Self {
        Self { tokens, pos: 0, body }
    }

    fn unexpected(&self, message: &str) -> Error {
        Error::Deserialization {
            message: format!("unexpected XML-RPC structure: {message}"),
            body: self.body.to_owned(),
        }
    }

    /// Skip whitespace between structural elements.
    fn skip_ws(&mut self) {
        while let Some(Token::Text(t)) = self.tokens.get(self.pos) {
            if !t.trim().is_empty() {
                break;
            }
            self.pos += 1;
        }
    }

    fn peek_open(&mut self) -> Option<String> {
        self.skip_ws();
        match self.tokens.get(self.pos) {
            Some(Token::Open(name)) => Some(name.clone()),
            _ => None,
        }
    }

    fn open(&mut self, name: &str) -> Result<(), Error> {
        self.skip_ws();
        match self.tokens.get(self.pos) {
            Some(Token::Open(n)) if n == name => {
                self.pos += 1;
                Ok(())
            }
            other => Err(self.unexpected(&format!("expected <{name}>, found {other:?}"))),
        }
    }

    fn close(&mut self, name: &str) -> Result<(), Error> {
        self.skip_ws();
        match self.tokens.get(self.pos) {
            Some(Token::Close(n)) if n == name => {
                self.pos += 1;
                Ok(())
            }
            other => Err(self.unexpected(&format!("expected </{name}>, found {other:?}"))),
        }
    }

    /// Raw text content at the cursor, or empty if an element follows.
    fn text(&mut self) -> String {
        match self.tokens.get(self.pos) {
            Some(Token::Text(t)) => {
                let text = t.clone();
                self.pos += 1;
                text
            }
            _ => String::new(),
        }
    }

    fn value(&mut self) -> Result<Value, Error> {
        self.open("value")?;

        // Untyped content is a string: `<value>abc</value>` or `<value/>`.
        match (self.tokens.get(self.pos), self.tokens.get(self.pos + 1)) {
            (Some(Token::Close(n)), _) if n == "value" => {
                self.pos += 1;
                return Ok(Value::String(String::new()));
            }
            (Some(Token::Text(t)), Some(Token::Close(n))) if n == "value" => {
                let text = t.clone();
                self.pos += 2;
                return Ok(Value::String(text));
            }
            _ => {}
        }

        let kind = self
            .peek_open()
            .ok_or_else(|| self.unexpected("expected a typed value"))?;
        self.pos += 1;

        let value = match kind.as_str() {
            "string" | "dateTime.iso8601" | "base64" => Value::String(self.text()),
            "int" | "i4" | "i8" => {
                let raw = self.text();
                let n: i64 = raw
                    .trim()
                    .parse()
                    .map_err(|_| self.unexpected(&format!("invalid integer {raw:?}")))?;
                Value::from(n)
            }
            "boolean" => match self.text().trim() {
                "1" | "true" => Value::Bool(true),
                "0" | "false" => Value::Bool(false),
                other => return Err(self.unexpected(&format!("invalid boolean {other:?}"))),
            },
            "double" => {
                let raw = self.text();
                let f: f64 = raw
                    .trim()
                    .parse()
                    .map_err(|_| self.unexpected(&format!("invalid double {raw:?}")))?;
                Number::from_f64(f).map_or(Value::Null, Value::Number)
            }
            "nil" => Value::Null,
            "struct" => {
                let mut map = Map::new();
                while self.peek_open().as_deref() == Some("member") {
                    self.open("member")?;
                    self.open("name")?;
                    let name = self.text();
                    self.close("name")?;
                    let member = self.value()?;
                    self.close("member")?;
                    map.insert(name, member);
                }
                Value::Object(map)
            }
            "array" => {
                let mut items = Vec::new();
                if self.peek_open().as_deref() == Some("data") {
                    self.open("data")?;
                    while self.peek_open().as_deref() == Some("value") {
                        items.push(self.value()?);
                    }
                    self.close("data")?;
                }
                Value::Array(items)
            }
            other => return Err(self.unexpected(&format!("unknown value type <{other}>"))),
        };

        self.close(&kind)?;
        self.close("value")?;
        Ok(value)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    #[test]
    fn encodes_request() {
        let req = RpcRequest::new(
            "session.login_with_password",
            vec![json!("root"), json!("p<w>d"), json!("1.1")],
        );
        insta::assert_snapshot!(
            encode_request(&req),
            @r#"<?xml version="1.0"?><methodCall><methodName>session.login_with_password</methodName><params><param><value><string>root</string></value></param><param><value><string>p&lt;w&gt;d</string></value></param><param><value><string>1.1</string></value></param></params></methodCall>"#
        );
    }

    #[test]
    fn wide_integers_travel_as_strings() {
        let req = RpcRequest::new("VM.set_memory", vec![json!(8_589_934_592_i64), json!(3)]);
        let xml = encode_request(&req);
        assert!(xml.contains("<string>8589934592</string>"));
        assert!(xml.contains("<int>3</int>"));
    }

    #[test]
    fn decodes_success_envelope() {
        let body = r#"<?xml version="1.0"?>
            <methodResponse>
              <params><param><value><struct>
                <member><name>Status</name><value>Success</value></member>
                <member><name>Value</name><value>OpaqueRef:abc</value></member>
              </struct></value></param></params>
            </methodResponse>"#;
        assert_eq!(
            decode_response(body).unwrap(),
            RpcResult::Success(json!("OpaqueRef:abc"))
        );
    }

    #[test]
    fn decodes_failure_envelope() {
        let body = r#"<methodResponse><params><param><value><struct>
            <member><name>Status</name><value>Failure</value></member>
            <member><name>ErrorDescription</name><value><array><data>
              <value>SESSION_INVALID</value><value>OpaqueRef:old</value>
            </data></array></value></member>
            </struct></value></param></params></methodResponse>"#;
        assert_eq!(
            decode_response(body).unwrap(),
            RpcResult::Fault(json!(["SESSION_INVALID", "OpaqueRef:old"]))
        );
    }

    #[test]
    fn decodes_typed_values() {
        let body = r#"<methodResponse><params><param><value><struct>
            <member><name>Status</name><value>Success</value></member>
            <member><name>Value</name><value><struct>
              <member><name>MTU</name><value><int>1500</int></value></member>
              <member><name>big</name><value><i8>-9000000000</i8></value></member>
              <member><name>up</name><value><boolean>1</boolean></value></member>
              <member><name>load</name><value><double>0.25</double></value></member>
              <member><name>padded</name><value><string>  a b  </string></value></member>
              <member><name>empty</name><value/></member>
              <member><name>nothing</name><value><nil/></value></member>
              <member><name>when</name><value><dateTime.iso8601>20240101T00:00:00Z</dateTime.iso8601></value></member>
              <member><name>tags</name><value><array><data/></array></value></member>
            </struct></value></member>
            </struct></value></param></params></methodResponse>"#;
        assert_eq!(
            decode_response(body).unwrap(),
            RpcResult::Success(json!({
                "MTU": 1500,
                "big": -9_000_000_000_i64,
                "up": true,
                "load": 0.25,
                "padded": "  a b  ",
                "empty": "",
                "nothing": null,
                "when": "20240101T00:00:00Z",
                "tags": [],
            }))
        );
    }

    #[test]
    fn decodes_classic_fault() {
        let body = r#"<methodResponse><fault><value><struct>
            <member><name>faultCode</name><value><int>-1</int></value></member>
            <member><name>faultString</name><value><string>boom</string></value></member>
            </struct></value></fault></methodResponse>"#;
        assert_eq!(
            decode_response(body).unwrap(),
            RpcResult::Fault(json!({"faultCode": -1, "faultString": "boom"}))
        );
    }

    #[test]
    fn request_round_trip() {
        let req = RpcRequest::new(
            "network.create",
            vec![
                json!("OpaqueRef:s"),
                json!({"name_label": "lan & wan", "MTU": 9000, "other_config": {}, "tags": ["a"]}),
                json!(true),
                json!(null),
            ],
        );
        assert_eq!(decode_request(&encode_request(&req)).unwrap(), req);
    }

    #[test]
    fn response_round_trip() {
        for resp in [
            RpcResult::Success(json!({"token": "42", "events": []})),
            RpcResult::Fault(json!(["HANDLE_INVALID", "VM", "OpaqueRef:x"])),
        ] {
            assert_eq!(decode_response(&encode_response(&resp)).unwrap(), resp);
        }
    }

    #[test]
    fn rejects_non_xmlrpc_documents() {
        assert!(matches!(
            decode_response("<html><body>nope</body></html>"),
            Err(Error::Deserialization { .. })
        ));
        assert!(matches!(
            decode_response("not xml <<<"),
            Err(Error::Deserialization { .. })
        ));
    }
}
