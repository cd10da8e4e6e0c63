//! Header JSON schema.
//!
//! ```text
//! directory:      {"files": {<name>: <entry>, ...}}
//! stored file:    {"size": 12, "offset": "1024", "executable": true}
//! unpacked file:  {"size": 12, "unpacked": true}
//! ```
//!
//! Offsets are written as decimal strings so archives past 2^53 bytes stay
//! exact in JavaScript readers; numbers are accepted on read as well.

use serde_json::{Map, Value};

use super::tree::{Directory, FileEntry, Flags, Node, Tree, UNPACKED_OFFSET};
use crate::error::{AsarError, Result};

/// Serialize a tree rooted at `root`. Key order follows child order.
pub fn to_json(root: &Directory) -> String {
    Value::Object(directory_json(root)).to_string()
}

fn directory_json(dir: &Directory) -> Map<String, Value> {
    let mut files = Map::new();
    for child in dir.children() {
        let entry = match child {
            Node::Directory(sub) => Value::Object(directory_json(sub)),
            Node::File(file) => file_json(file),
        };
        files.insert(child.name().to_string(), entry);
    }

    let mut obj = Map::new();
    obj.insert("files".into(), Value::Object(files));
    obj
}

fn file_json(file: &FileEntry) -> Value {
    let mut obj = Map::new();
    obj.insert("size".into(), Value::from(file.size()));
    if file.is_unpacked() {
        obj.insert("unpacked".into(), Value::Bool(true));
    } else {
        obj.insert("offset".into(), Value::String(file.offset().to_string()));
    }
    if file.is_executable() {
        obj.insert("executable".into(), Value::Bool(true));
    }
    Value::Object(obj)
}

/// Parse header text into a tree. Unknown keys such as `integrity` are ignored.
pub fn parse(text: &str) -> Result<Tree> {
    let value: Value = serde_json::from_str(text)
        .map_err(|e| AsarError::MalformedHeader(format!("invalid JSON: {}", e)))?;
    let Value::Object(obj) = &value else {
        return Err(malformed("", "header is not an object"));
    };
    Ok(Tree::new(parse_directory(String::new(), obj, "")?))
}

fn parse_directory(name: String, obj: &Map<String, Value>, path: &str) -> Result<Directory> {
    if obj.contains_key("size") || obj.contains_key("offset") {
        return Err(malformed(path, "directory carries size/offset"));
    }
    let Some(Value::Object(files)) = obj.get("files") else {
        return Err(malformed(path, "\"files\" is not an object"));
    };

    let mut dir = Directory::new(name);
    for (child_name, entry) in files {
        let child_path = if path.is_empty() {
            child_name.clone()
        } else {
            format!("{}/{}", path, child_name)
        };
        let Value::Object(entry) = entry else {
            return Err(malformed(&child_path, "entry is not an object"));
        };

        let node = if entry.contains_key("files") {
            Node::Directory(parse_directory(child_name.clone(), entry, &child_path)?)
        } else {
            Node::File(parse_file(child_name.clone(), entry, &child_path)?)
        };
        dir.insert(node)
            .map_err(|e| AsarError::MalformedHeader(e.to_string()))?;
    }
    Ok(dir)
}

fn parse_file(name: String, obj: &Map<String, Value>, path: &str) -> Result<FileEntry> {
    if obj.contains_key("link") {
        return Err(malformed(path, "symbolic link entries are not supported"));
    }

    let mut flags = Flags::NONE;
    if bool_field(obj, "executable", path)? {
        flags |= Flags::EXECUTABLE;
    }
    let unpacked = bool_field(obj, "unpacked", path)?;

    let size = match obj.get("size") {
        Some(v) => v
            .as_u64()
            .ok_or_else(|| malformed(path, "\"size\" is not an unsigned integer"))?,
        None => return Err(malformed(path, "file has no size")),
    };

    if unpacked {
        flags |= Flags::UNPACKED;
        return Ok(FileEntry::new(name, size, UNPACKED_OFFSET, flags));
    }

    let offset = match obj.get("offset") {
        Some(Value::String(s)) => s
            .parse::<u64>()
            .map_err(|_| malformed(path, "\"offset\" is not a decimal integer"))?,
        Some(v) => v
            .as_u64()
            .ok_or_else(|| malformed(path, "\"offset\" is not an unsigned integer"))?,
        None => return Err(malformed(path, "file has neither offset nor unpacked marker")),
    };
    Ok(FileEntry::new(name, size, offset, flags))
}

fn bool_field(obj: &Map<String, Value>, key: &str, path: &str) -> Result<bool> {
    match obj.get(key) {
        None => Ok(false),
        Some(Value::Bool(b)) => Ok(*b),
        Some(_) => Err(malformed(path, &format!("\"{}\" is not a boolean", key))),
    }
}

fn malformed(path: &str, what: &str) -> AsarError {
    if path.is_empty() {
        AsarError::MalformedHeader(what.to_string())
    } else {
        AsarError::MalformedHeader(format!("{}: {}", path, what))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn is_malformed(text: &str) -> bool {
        matches!(parse(text), Err(AsarError::MalformedHeader(_)))
    }

    #[test]
    fn writes_offsets_as_strings_in_child_order() {
        let mut sub = Directory::new("sub");
        sub.insert(Node::File(FileEntry::new("z".into(), 3, 2, Flags::EXECUTABLE)))
            .unwrap();
        let mut root = Directory::new("");
        root.insert(Node::File(FileEntry::new("b".into(), 2, 0, Flags::NONE)))
            .unwrap();
        root.insert(Node::Directory(sub)).unwrap();
        root.insert(Node::File(FileEntry::new(
            "a".into(),
            9,
            UNPACKED_OFFSET,
            Flags::UNPACKED,
        )))
        .unwrap();

        assert_eq!(
            to_json(&root),
            r#"{"files":{"b":{"size":2,"offset":"0"},"sub":{"files":{"z":{"size":3,"offset":"2","executable":true}}},"a":{"size":9,"unpacked":true}}}"#
        );
    }

    #[test]
    fn accepts_numeric_offsets_and_unknown_keys() {
        let tree = parse(
            r#"{"files":{"x":{"size":4,"offset":7,"integrity":{"algorithm":"SHA256"}}}}"#,
        )
        .unwrap();
        let Some(Node::File(x)) = tree.find("x") else {
            panic!("x missing");
        };
        assert_eq!((x.size(), x.offset()), (4, 7));
    }

    #[test]
    fn large_offsets_survive() {
        let tree = parse(r#"{"files":{"x":{"size":1,"offset":"18446744073709551000"}}}"#).unwrap();
        let Some(Node::File(x)) = tree.find("x") else {
            panic!("x missing");
        };
        assert_eq!(x.offset(), 18446744073709551000);
    }

    #[test]
    fn unpacked_files_get_the_sentinel_offset() {
        let tree = parse(r#"{"files":{"x":{"size":5,"unpacked":true}}}"#).unwrap();
        let Some(Node::File(x)) = tree.find("x") else {
            panic!("x missing");
        };
        assert!(x.is_unpacked());
        assert_eq!(x.offset(), UNPACKED_OFFSET);
    }

    #[test]
    fn schema_violations_are_malformed() {
        assert!(is_malformed("not json"));
        assert!(is_malformed("[]"));
        assert!(is_malformed(r#"{"nofiles":{}}"#));
        assert!(is_malformed(r#"{"files":[]}"#));
        assert!(is_malformed(r#"{"files":{"x":1}}"#));
        assert!(is_malformed(r#"{"files":{"x":{"size":1}}}"#));
        assert!(is_malformed(r#"{"files":{"x":{"offset":"0"}}}"#));
        assert!(is_malformed(r#"{"files":{"x":{"size":"1","offset":"0"}}}"#));
        assert!(is_malformed(r#"{"files":{"x":{"size":1,"offset":"-1"}}}"#));
        assert!(is_malformed(r#"{"files":{"x":{"size":1,"offset":"0","executable":"yes"}}}"#));
        assert!(is_malformed(r#"{"files":{"d":{"files":{},"size":0}}}"#));
        assert!(is_malformed(r#"{"files":{"l":{"link":"x"}}}"#));
    }

    #[test]
    fn wide_directories_parse_in_linear_time() {
        const SIBLINGS: u64 = 50_000;
        let mut root = Directory::new("");
        for i in 0..SIBLINGS {
            root.insert(Node::File(FileEntry::new(format!("f{:07}", i), 1, i, Flags::NONE)))
                .unwrap();
        }
        let text = to_json(&root);

        let started = std::time::Instant::now();
        let tree = parse(&text).unwrap();
        assert!(started.elapsed() < std::time::Duration::from_secs(10));

        assert_eq!(tree.root().children().len() as u64, SIBLINGS);
        let Some(Node::File(last)) = tree.find("f0049999") else {
            panic!("last sibling missing");
        };
        assert_eq!(last.offset(), SIBLINGS - 1);
        let first = tree.walk().next().map(|(p, _)| p);
        assert_eq!(first.as_deref(), Some("f0000000"));
    }
}
