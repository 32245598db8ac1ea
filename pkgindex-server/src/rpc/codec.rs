//! XML-RPC wire format.
//!
//! Parsing builds a small element tree with `quick-xml` and then reads the
//! envelope from it; rendering writes the envelope directly, escaping text
//! with `quick_xml::escape`.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::NaiveDateTime;
use indexmap::IndexMap;
use quick_xml::escape::escape;
use quick_xml::events::Event;
use quick_xml::Reader;
use thiserror::Error;

use super::{Fault, MethodCall, Value};

const DATETIME_FORMAT: &str = "%Y%m%dT%H:%M:%S";
const DATETIME_FORMAT_DASHED: &str = "%Y-%m-%dT%H:%M:%S";

/// Deepest element nesting accepted. Value decoding recurses once per level.
pub const MAX_DEPTH: usize = 64;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("Malformed XML: {0}")]
    Xml(String),

    #[error("Invalid XML-RPC envelope: {0}")]
    Envelope(String),
}

fn envelope(message: impl Into<String>) -> CodecError {
    CodecError::Envelope(message.into())
}

#[derive(Debug, Default)]
struct Element {
    name: String,
    text: String,
    children: Vec<Element>,
}

impl Element {
    fn new(name: String) -> Self {
        Self {
            name,
            ..Default::default()
        }
    }

    fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|child| child.name == name)
    }

    fn expect_child(&self, name: &str) -> Result<&Element, CodecError> {
        self.child(name)
            .ok_or_else(|| envelope(format!("<{}> is missing <{name}>", self.name)))
    }

    fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> + 'a {
        self.children.iter().filter(move |child| child.name == name)
    }
}

fn parse_tree(xml: &str) -> Result<Element, CodecError> {
    let mut reader = Reader::from_str(xml);
    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;

    loop {
        let event = reader
            .read_event()
            .map_err(|e| CodecError::Xml(e.to_string()))?;

        match event {
            Event::Start(start) => {
                if stack.len() >= MAX_DEPTH {
                    return Err(CodecError::Xml(format!(
                        "document nested deeper than {MAX_DEPTH} elements"
                    )));
                }
                let name = String::from_utf8_lossy(start.local_name().as_ref()).into_owned();
                stack.push(Element::new(name));
            }
            Event::Empty(start) => {
                let name = String::from_utf8_lossy(start.local_name().as_ref()).into_owned();
                attach(&mut stack, &mut root, Element::new(name))?;
            }
            Event::End(_) => {
                let element = stack
                    .pop()
                    .ok_or_else(|| CodecError::Xml("unbalanced end tag".to_string()))?;
                attach(&mut stack, &mut root, element)?;
            }
            Event::Text(text) => {
                if let Some(top) = stack.last_mut() {
                    let text = text
                        .unescape()
                        .map_err(|e| CodecError::Xml(e.to_string()))?;
                    top.text.push_str(&text);
                }
            }
            Event::CData(data) => {
                if let Some(top) = stack.last_mut() {
                    let data = data.into_inner();
                    let text = std::str::from_utf8(&data)
                        .map_err(|e| CodecError::Xml(e.to_string()))?;
                    top.text.push_str(text);
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !stack.is_empty() {
        return Err(CodecError::Xml("unexpected end of document".to_string()));
    }
    root.ok_or_else(|| CodecError::Xml("empty document".to_string()))
}

fn attach(
    stack: &mut [Element],
    root: &mut Option<Element>,
    element: Element,
) -> Result<(), CodecError> {
    match stack.last_mut() {
        Some(parent) => parent.children.push(element),
        None if root.is_none() => *root = Some(element),
        None => return Err(CodecError::Xml("multiple root elements".to_string())),
    }
    Ok(())
}

/// Decode a `methodCall` document.
pub fn parse_method_call(xml: &str) -> Result<MethodCall, CodecError> {
    let root = parse_tree(xml)?;
    if root.name != "methodCall" {
        return Err(envelope(format!("expected <methodCall>, found <{}>", root.name)));
    }

    let method = root.expect_child("methodName")?.text.trim().to_string();
    if method.is_empty() {
        return Err(envelope("empty <methodName>"));
    }

    let params = match root.child("params") {
        Some(params) => parse_params(params)?,
        None => Vec::new(),
    };

    Ok(MethodCall { method, params })
}

/// Decode a `methodResponse` document into its value or fault.
pub fn parse_method_response(xml: &str) -> Result<Result<Value, Fault>, CodecError> {
    let root = parse_tree(xml)?;
    if root.name != "methodResponse" {
        return Err(envelope(format!(
            "expected <methodResponse>, found <{}>",
            root.name
        )));
    }

    if let Some(fault) = root.child("fault") {
        let value = parse_value(fault.expect_child("value")?)?;
        let members = value
            .as_struct()
            .ok_or_else(|| envelope("fault value is not a struct"))?;
        let code = match members.get("faultCode") {
            Some(Value::Int(code)) => i32::try_from(*code).map_err(|e| envelope(e.to_string()))?,
            _ => return Err(envelope("fault is missing faultCode")),
        };
        let message = members
            .get("faultString")
            .and_then(Value::as_str)
            .unwrap_or_default();
        return Ok(Err(Fault::new(code, message)));
    }

    let mut params = parse_params(root.expect_child("params")?)?;
    if params.len() != 1 {
        return Err(envelope("response must carry exactly one param"));
    }
    Ok(Ok(params.remove(0)))
}

fn parse_params(params: &Element) -> Result<Vec<Value>, CodecError> {
    params
        .children_named("param")
        .map(|param| parse_value(param.expect_child("value")?))
        .collect()
}

fn parse_value(value: &Element) -> Result<Value, CodecError> {
    let Some(typed) = value.children.first() else {
        return Ok(Value::String(value.text.clone()));
    };
    let text = typed.text.trim();

    match typed.name.as_str() {
        "int" | "i4" | "i8" => text
            .parse()
            .map(Value::Int)
            .map_err(|_| envelope(format!("invalid int '{text}'"))),
        "boolean" => match text {
            "1" => Ok(Value::Bool(true)),
            "0" => Ok(Value::Bool(false)),
            other => Err(envelope(format!("invalid boolean '{other}'"))),
        },
        "string" => Ok(Value::String(typed.text.clone())),
        "double" => text
            .parse()
            .map(Value::Double)
            .map_err(|_| envelope(format!("invalid double '{text}'"))),
        "dateTime.iso8601" => NaiveDateTime::parse_from_str(text, DATETIME_FORMAT)
            .or_else(|_| NaiveDateTime::parse_from_str(text, DATETIME_FORMAT_DASHED))
            .map(Value::DateTime)
            .map_err(|_| envelope(format!("invalid dateTime '{text}'"))),
        "base64" => {
            let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
            STANDARD
                .decode(compact)
                .map(Value::Base64)
                .map_err(|e| envelope(format!("invalid base64: {e}")))
        }
        "array" => {
            let data = typed.expect_child("data")?;
            data.children_named("value")
                .map(parse_value)
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array)
        }
        "struct" => {
            let mut members = IndexMap::new();
            for member in typed.children_named("member") {
                let name = member.expect_child("name")?.text.clone();
                let value = parse_value(member.expect_child("value")?)?;
                members.insert(name, value);
            }
            Ok(Value::Struct(members))
        }
        "nil" => Ok(Value::Nil),
        other => Err(envelope(format!("unknown value type <{other}>"))),
    }
}

/// Encode a successful result.
pub fn render_response(value: &Value) -> String {
    let mut out = String::from("<?xml version=\"1.0\"?>\n<methodResponse><params><param>");
    write_value(&mut out, value);
    out.push_str("</param></params></methodResponse>\n");
    out
}

/// Encode a fault.
pub fn render_fault(fault: &Fault) -> String {
    let members: IndexMap<String, Value> = IndexMap::from([
        ("faultCode".to_string(), Value::Int(fault.code.into())),
        ("faultString".to_string(), Value::String(fault.message.clone())),
    ]);

    let mut out = String::from("<?xml version=\"1.0\"?>\n<methodResponse><fault>");
    write_value(&mut out, &Value::Struct(members));
    out.push_str("</fault></methodResponse>\n");
    out
}

/// Encode a call. Used by clients and tests.
pub fn render_method_call(call: &MethodCall) -> String {
    let mut out = String::from("<?xml version=\"1.0\"?>\n<methodCall><methodName>");
    out.push_str(&escape(call.method.as_str()));
    out.push_str("</methodName><params>");
    for param in &call.params {
        out.push_str("<param>");
        write_value(&mut out, param);
        out.push_str("</param>");
    }
    out.push_str("</params></methodCall>\n");
    out
}

fn write_value(out: &mut String, value: &Value) {
    out.push_str("<value>");
    match value {
        Value::Int(i) => out.push_str(&format!("<int>{i}</int>")),
        Value::Bool(b) => out.push_str(if *b {
            "<boolean>1</boolean>"
        } else {
            "<boolean>0</boolean>"
        }),
        Value::String(s) => {
            out.push_str("<string>");
            out.push_str(&escape(s.as_str()));
            out.push_str("</string>");
        }
        Value::Double(d) => out.push_str(&format!("<double>{d}</double>")),
        Value::DateTime(dt) => out.push_str(&format!(
            "<dateTime.iso8601>{}</dateTime.iso8601>",
            dt.format(DATETIME_FORMAT)
        )),
        Value::Base64(bytes) => {
            out.push_str("<base64>");
            out.push_str(&STANDARD.encode(bytes));
            out.push_str("</base64>");
        }
        Value::Array(items) => {
            out.push_str("<array><data>");
            for item in items {
                write_value(out, item);
            }
            out.push_str("</data></array>");
        }
        Value::Struct(members) => {
            out.push_str("<struct>");
            for (name, member) in members {
                out.push_str("<member><name>");
                out.push_str(&escape(name.as_str()));
                out.push_str("</name>");
                write_value(out, member);
                out.push_str("</member>");
            }
            out.push_str("</struct>");
        }
        Value::Nil => out.push_str("<nil/>"),
    }
    out.push_str("</value>");
}
