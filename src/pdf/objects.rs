//! Small helpers over the lopdf object graph

use lopdf::{Dictionary, Document, Object, ObjectId, Stream};

/// Nesting limit for the page tree when looking up inherited attributes
const MAX_TREE_DEPTH: usize = 64;

pub(crate) fn number(object: &Object) -> Option<f64> {
    match object {
        Object::Integer(value) => Some(*value as f64),
        Object::Real(value) => Some(*value as f64),
        _ => None,
    }
}

/// Follow one level of indirection
pub(crate) fn resolve<'a>(doc: &'a Document, object: &'a Object) -> Option<&'a Object> {
    match object {
        Object::Reference(id) => doc.get_object(*id).ok(),
        other => Some(other),
    }
}

pub(crate) fn resolve_dict<'a>(doc: &'a Document, object: &'a Object) -> Option<&'a Dictionary> {
    match resolve(doc, object)? {
        Object::Dictionary(dict) => Some(dict),
        Object::Stream(stream) => Some(&stream.dict),
        _ => None,
    }
}

pub(crate) fn name_of<'a>(doc: &'a Document, object: &'a Object) -> Option<&'a [u8]> {
    match resolve(doc, object)? {
        Object::Name(name) => Some(name.as_slice()),
        _ => None,
    }
}

/// Look up a page attribute, following `/Parent` for inherited entries.
pub(crate) fn inherited<'a>(doc: &'a Document, page_id: ObjectId, key: &[u8]) -> Option<&'a Object> {
    let mut current = doc.get_dictionary(page_id).ok();
    let mut depth = 0;
    while let Some(dict) = current {
        if let Ok(value) = dict.get(key) {
            return resolve(doc, value);
        }
        depth += 1;
        if depth > MAX_TREE_DEPTH {
            break;
        }
        current = match dict.get(b"Parent") {
            Ok(Object::Reference(parent)) => doc.get_dictionary(*parent).ok(),
            _ => None,
        };
    }
    None
}

/// A page's MediaBox as `[x1, y1, x2, y2]`, normalized
pub(crate) fn media_box(doc: &Document, page_id: ObjectId) -> Option<[f64; 4]> {
    let values: Vec<f64> = match inherited(doc, page_id, b"MediaBox")? {
        Object::Array(values) => values
            .iter()
            .map(|obj| resolve(doc, obj).and_then(number))
            .collect::<Option<Vec<f64>>>()?,
        _ => return None,
    };
    match values.as_slice() {
        [x1, y1, x2, y2] => Some([x1.min(*x2), y1.min(*y2), x1.max(*x2), y1.max(*y2)]),
        _ => None,
    }
}

/// Raw content of a stream, decompressed when a filter is present.
pub(crate) fn stream_content(stream: &Stream) -> lopdf::Result<Vec<u8>> {
    if stream.dict.has(b"Filter") {
        stream.decompressed_content()
    } else {
        Ok(stream.content.clone())
    }
}
