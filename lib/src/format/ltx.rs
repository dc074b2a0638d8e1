//! Reader for LTX, the ini dialect used by X-Ray text sidecars.
//!
//! Section and key names are case-insensitive and stored lower-cased.
//! `;` starts a comment. A section header may name parents to inherit
//! from: `[child]:base_a, base_b`.

use std::str::FromStr;

use indexmap::IndexMap;
use nom::{
    branch::alt,
    bytes::complete::{is_not, tag, tag_no_case, take_till},
    character::complete::{char, hex_digit1, i64 as dec_i64, space0},
    combinator::{all_consuming, map, map_res, opt, recognize, rest, value},
    multi::{many0, separated_list0},
    sequence::{delimited, pair, preceded, terminated, tuple},
    IResult,
};

use crate::{
    error::{Error, Result},
    format::Vector3f,
};

#[derive(Clone, Debug, Default)]
pub struct LtxSection {
    pub name: String,
    items: IndexMap<String, LtxValue>,
}

#[derive(Clone, Debug)]
struct LtxValue {
    value: String,
    line: usize,
}

impl LtxSection {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.items.get(&key.to_ascii_lowercase()).map(|v| v.value.as_str())
    }

    pub fn len(&self) -> usize { self.items.len() }

    pub fn is_empty(&self) -> bool { self.items.is_empty() }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.items.iter().map(|(k, v)| (k.as_str(), v.value.as_str()))
    }
}

#[derive(Clone, Debug, Default)]
pub struct Ltx {
    sections: IndexMap<String, LtxSection>,
}

impl FromStr for Ltx {
    type Err = Error;

    fn from_str(text: &str) -> Result<Self> { Self::parse(text) }
}

impl Ltx {
    /// Parses raw file bytes. Non-UTF-8 bytes are replaced.
    pub fn from_bytes(data: &[u8]) -> Result<Self> { Self::parse(&String::from_utf8_lossy(data)) }

    pub fn parse(text: &str) -> Result<Self> {
        let mut ltx = Ltx::default();
        let mut current: Option<String> = None;
        for (idx, raw) in text.lines().enumerate() {
            let line_no = idx + 1;
            let (_, content) = strip_comment(raw)
                .map_err(|_| Error::ltx(Some(line_no), "unreadable line"))?;
            let content = content.trim();
            if content.is_empty() {
                continue;
            }
            let (_, parsed) =
                line(content).map_err(|_| Error::ltx(Some(line_no), "unreadable line"))?;

            match parsed {
                Line::Include => {
                    log::warn!("LTX line {line_no}: ignoring include directive");
                }
                Line::Unterminated => {
                    return Err(Error::ltx(Some(line_no), "unterminated section header"));
                }
                Line::Section { name, parents } => {
                    let name = name.trim().to_ascii_lowercase();
                    if name.is_empty() {
                        return Err(Error::ltx(Some(line_no), "empty section name"));
                    }
                    let mut section = LtxSection { name: name.clone(), items: IndexMap::new() };
                    for parent in parents.iter().map(|p| p.trim()).filter(|p| !p.is_empty()) {
                        let parent = parent.to_ascii_lowercase();
                        let Some(base) = ltx.sections.get(&parent) else {
                            return Err(Error::ltx(
                                Some(line_no),
                                format!("section [{name}] inherits unknown section [{parent}]"),
                            ));
                        };
                        section.items.extend(base.items.clone());
                    }
                    if ltx.sections.insert(name.clone(), section).is_some() {
                        log::warn!("LTX line {line_no}: section [{name}] redefined");
                    }
                    current = Some(name);
                }
                Line::Item { key, value } => {
                    let Some(section) =
                        current.as_ref().and_then(|name| ltx.sections.get_mut(name))
                    else {
                        return Err(Error::ltx(Some(line_no), "key outside of any section"));
                    };
                    let key = key.trim();
                    if key.is_empty() {
                        return Err(Error::ltx(Some(line_no), "empty key"));
                    }
                    section.items.insert(key.to_ascii_lowercase(), LtxValue {
                        value: value.map_or("", str::trim).to_string(),
                        line: line_no,
                    });
                }
            }
        }
        Ok(ltx)
    }

    pub fn section(&self, name: &str) -> Option<&LtxSection> {
        self.sections.get(&name.to_ascii_lowercase())
    }

    pub fn sections(&self) -> impl Iterator<Item = &LtxSection> { self.sections.values() }

    pub fn section_exist(&self, name: &str) -> bool { self.section(name).is_some() }

    pub fn line_exist(&self, section: &str, key: &str) -> bool {
        self.section(section).and_then(|s| s.get(key)).is_some()
    }

    fn value(&self, section: &str, key: &str) -> Result<&LtxValue> {
        let s = self
            .section(section)
            .ok_or_else(|| Error::ltx(None, format!("missing section [{section}]")))?;
        s.items
            .get(&key.to_ascii_lowercase())
            .ok_or_else(|| Error::ltx(None, format!("missing key '{key}' in section [{section}]")))
    }

    fn parse_value<T: FromStr>(&self, section: &str, key: &str) -> Result<T> {
        let v = self.value(section, key)?;
        v.value.parse().map_err(|_| {
            Error::ltx(Some(v.line), format!("invalid value '{}' for key '{key}'", v.value))
        })
    }

    pub fn r_string(&self, section: &str, key: &str) -> Result<&str> {
        Ok(self.value(section, key)?.value.as_str())
    }

    /// Reads a string, removing surrounding double quotes.
    pub fn r_string_wb(&self, section: &str, key: &str) -> Result<&str> {
        let s = self.r_string(section, key)?;
        Ok(s.strip_prefix('"').and_then(|s| s.strip_suffix('"')).unwrap_or(s))
    }

    pub fn r_u32(&self, section: &str, key: &str) -> Result<u32> {
        let v = self.value(section, key)?;
        parse_int(&v.value).and_then(|n| u32::try_from(n).ok()).ok_or_else(|| {
            Error::ltx(Some(v.line), format!("invalid u32 '{}' for key '{key}'", v.value))
        })
    }

    pub fn r_u16(&self, section: &str, key: &str) -> Result<u16> {
        let v = self.value(section, key)?;
        parse_int(&v.value).and_then(|n| u16::try_from(n).ok()).ok_or_else(|| {
            Error::ltx(Some(v.line), format!("invalid u16 '{}' for key '{key}'", v.value))
        })
    }

    pub fn r_i32(&self, section: &str, key: &str) -> Result<i32> { self.parse_value(section, key) }

    pub fn r_u64(&self, section: &str, key: &str) -> Result<u64> { self.parse_value(section, key) }

    pub fn r_f32(&self, section: &str, key: &str) -> Result<f32> { self.parse_value(section, key) }

    /// `on`, `yes`, `true` and non-zero integers are true.
    pub fn r_bool(&self, section: &str, key: &str) -> Result<bool> {
        let v = self.r_string(section, key)?.to_ascii_lowercase();
        Ok(match v.as_str() {
            "on" | "yes" | "true" => true,
            other => other.parse::<i64>().map_or(false, |n| n != 0),
        })
    }

    /// Reads a `x, y, z` triple.
    pub fn r_vec3(&self, section: &str, key: &str) -> Result<Vector3f> {
        let v = self.value(section, key)?;
        let invalid =
            || Error::ltx(Some(v.line), format!("invalid vector '{}' for key '{key}'", v.value));
        let mut parts = v.value.split(',').map(|p| p.trim().parse::<f32>());
        let mut next = || parts.next().and_then(|r| r.ok()).ok_or_else(invalid);
        let out = Vector3f { x: next()?, y: next()?, z: next()? };
        Ok(out)
    }
}

#[derive(Clone, Debug, PartialEq)]
enum Line<'a> {
    Include,
    Section { name: &'a str, parents: Vec<&'a str> },
    Unterminated,
    Item { key: &'a str, value: Option<&'a str> },
}

/// A double-quoted run; a missing closing quote runs to the end of the line.
fn quoted(input: &str) -> IResult<&str, &str> {
    recognize(tuple((char('"'), take_till(|c| c == '"'), opt(char('"')))))(input)
}

/// Everything before a `;` that is not inside quotes.
fn strip_comment(input: &str) -> IResult<&str, &str> {
    terminated(
        recognize(many0(alt((quoted, is_not("\";"))))),
        opt(preceded(char(';'), rest)),
    )(input)
}

/// `[name]` optionally followed by `:parent, parent`.
fn header(input: &str) -> IResult<&str, (&str, Vec<&str>)> {
    pair(
        delimited(char('['), take_till(|c| c == ']'), char(']')),
        map(
            opt(preceded(
                pair(space0, char(':')),
                separated_list0(char(','), take_till(|c| c == ',')),
            )),
            Option::unwrap_or_default,
        ),
    )(input)
}

fn item(input: &str) -> IResult<&str, (&str, Option<&str>)> {
    pair(take_till(|c| c == '='), opt(preceded(char('='), rest)))(input)
}

fn line(input: &str) -> IResult<&str, Line<'_>> {
    alt((
        value(Line::Include, preceded(tag("#include"), rest)),
        map(header, |(name, parents)| Line::Section { name, parents }),
        value(Line::Unterminated, preceded(char('['), rest)),
        map(item, |(key, value)| Line::Item { key, value }),
    ))(input)
}

/// Decimal or `0x` hexadecimal integer.
fn int(input: &str) -> IResult<&str, i64> {
    alt((
        preceded(tag_no_case("0x"), map_res(hex_digit1, |h: &str| i64::from_str_radix(h, 16))),
        dec_i64,
    ))(input)
}

fn parse_int(s: &str) -> Option<i64> { all_consuming(int)(s).ok().map(|(_, n)| n) }

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
; level sidecar
[version]
value = 5

[Level_Options]
version      = 12        ; current
level_path   = levels\escape
bop          = "bop text; with semicolon"
usage_deathmatch = on
hex          = 0x7F

[base]
a = 1
b = 2

[child]:base
b = 3
flag
"#;

    #[test]
    fn sections_and_values() {
        let ltx: Ltx = SAMPLE.parse().unwrap();
        assert_eq!(ltx.r_u32("version", "value").unwrap(), 5);
        assert_eq!(ltx.r_u32("level_options", "VERSION").unwrap(), 12);
        assert_eq!(ltx.r_string("level_options", "level_path").unwrap(), r"levels\escape");
        assert_eq!(ltx.r_string_wb("level_options", "bop").unwrap(), "bop text; with semicolon");
        assert!(ltx.r_bool("level_options", "usage_deathmatch").unwrap());
        assert_eq!(ltx.r_u32("level_options", "hex").unwrap(), 0x7F);
    }

    #[test]
    fn inheritance_and_bare_keys() {
        let ltx = Ltx::parse(SAMPLE).unwrap();
        assert_eq!(ltx.r_u32("child", "a").unwrap(), 1);
        assert_eq!(ltx.r_u32("child", "b").unwrap(), 3);
        assert!(ltx.line_exist("child", "flag"));
        assert_eq!(ltx.r_string("child", "flag").unwrap(), "");
        assert_eq!(ltx.r_u32("base", "b").unwrap(), 2);
    }

    #[test]
    fn missing_and_invalid() {
        let ltx = Ltx::parse(SAMPLE).unwrap();
        assert!(matches!(ltx.r_u32("absent", "value"), Err(Error::Ltx { line: None, .. })));
        assert!(matches!(ltx.r_f32("version", "nope"), Err(Error::Ltx { line: None, .. })));
        assert!(matches!(
            ltx.r_u16("level_options", "level_path"),
            Err(Error::Ltx { line: Some(8), .. })
        ));
    }

    #[test]
    fn syntax_errors() {
        assert!(matches!(Ltx::parse("a = 1"), Err(Error::Ltx { line: Some(1), .. })));
        assert!(matches!(Ltx::parse("[open\nk = v"), Err(Error::Ltx { line: Some(1), .. })));
        assert!(Ltx::parse("[x]:missing").is_err());
    }

    #[test]
    fn line_grammar() {
        assert_eq!(strip_comment(r#"a = "x;y" ; note"#).unwrap().1, r#"a = "x;y" "#);
        assert_eq!(strip_comment(r#"a = "open;"#).unwrap().1, r#"a = "open;"#);
        assert_eq!(
            line("[child] : a, ,b").unwrap().1,
            Line::Section { name: "child", parents: vec![" a", " ", "b"] }
        );
        assert_eq!(line("[open").unwrap().1, Line::Unterminated);
        assert_eq!(line("#include \"x.ltx\"").unwrap().1, Line::Include);
        assert_eq!(line("k=v=w").unwrap().1, Line::Item { key: "k", value: Some("v=w") });
        assert_eq!(parse_int("0X1f"), Some(31));
        assert_eq!(parse_int("-12"), Some(-12));
        assert_eq!(parse_int("12abc"), None);
        assert_eq!(parse_int("0x"), None);
    }

    #[test]
    fn multiple_parents_and_errors() {
        let ltx = Ltx::parse("[a]\nx = 1\n[b]\ny = 2\n[c]:a, b\ny = 3").unwrap();
        assert_eq!(ltx.r_u32("c", "x").unwrap(), 1);
        assert_eq!(ltx.r_u32("c", "y").unwrap(), 3);
        assert!(matches!(Ltx::parse("[]"), Err(Error::Ltx { line: Some(1), .. })));
        assert!(matches!(Ltx::parse("[s]\n = 4"), Err(Error::Ltx { line: Some(2), .. })));
        let empty = Ltx::parse("; only a comment\n#include \"other.ltx\"").unwrap();
        assert!(empty.sections().next().is_none());
    }

    #[test]
    fn vectors() {
        let ltx = Ltx::parse("[obj]\nposition = 1.5, -2, 0.25\nbad = 1, 2").unwrap();
        assert_eq!(ltx.r_vec3("obj", "position").unwrap(), Vector3f::new(1.5, -2.0, 0.25));
        assert!(ltx.r_vec3("obj", "bad").is_err());
    }
}
