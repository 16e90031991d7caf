use lopdf::{Dictionary, Document, Object, ObjectId};

const MAX_REFERENCE_DEPTH: usize = 32;

pub(crate) fn resolve<'a>(doc: &'a Document, object: &'a Object) -> &'a Object {
    let mut current = object;
    for _ in 0..MAX_REFERENCE_DEPTH {
        let Object::Reference(id) = current else {
            return current;
        };
        match doc.get_object(*id) {
            Ok(next) => current = next,
            Err(_) => return current,
        }
    }
    current
}

pub(crate) fn number(object: &Object) -> Option<f64> {
    match object {
        Object::Integer(value) => Some(*value as f64),
        Object::Real(value) => Some(f64::from(*value)),
        _ => None,
    }
}

pub(crate) fn dict_entry<'a>(
    doc: &'a Document,
    dict: &'a Dictionary,
    key: &[u8],
) -> Option<&'a Object> {
    dict.get(key).ok().map(|object| resolve(doc, object))
}

pub(crate) fn dict_dictionary<'a>(
    doc: &'a Document,
    dict: &'a Dictionary,
    key: &[u8],
) -> Option<&'a Dictionary> {
    dict_entry(doc, dict, key).and_then(|object| object.as_dict().ok())
}

pub(crate) fn dict_number(doc: &Document, dict: &Dictionary, key: &[u8]) -> Option<f64> {
    dict_entry(doc, dict, key).and_then(number)
}

/// Looks a key up on a page, walking `/Parent` for inheritable attributes.
pub(crate) fn inherited<'a>(
    doc: &'a Document,
    page_id: ObjectId,
    key: &[u8],
) -> Option<&'a Object> {
    let mut dict = doc.get_dictionary(page_id).ok()?;
    for _ in 0..MAX_REFERENCE_DEPTH {
        if let Some(value) = dict_entry(doc, dict, key) {
            return Some(value);
        }
        let parent = dict.get(b"Parent").ok()?.as_reference().ok()?;
        dict = doc.get_dictionary(parent).ok()?;
    }
    None
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct MediaBox {
    pub x0: f64,
    pub y0: f64,
    pub x1: f64,
    pub y1: f64,
}

impl MediaBox {
    pub fn width(&self) -> f64 {
        (self.x1 - self.x0).abs()
    }

    pub fn height(&self) -> f64 {
        (self.y1 - self.y0).abs()
    }
}

impl Default for MediaBox {
    fn default() -> Self {
        Self { x0: 0.0, y0: 0.0, x1: 612.0, y1: 792.0 }
    }
}

pub(crate) fn media_box(doc: &Document, page_id: ObjectId) -> MediaBox {
    inherited(doc, page_id, b"MediaBox")
        .and_then(|object| object.as_array().ok())
        .and_then(|array| {
            if array.len() != 4 {
                return None;
            }
            let values: Vec<f64> =
                array.iter().filter_map(|item| number(resolve(doc, item))).collect();
            let [x0, y0, x1, y1] = values.as_slice() else {
                return None;
            };
            Some(MediaBox {
                x0: x0.min(*x1),
                y0: y0.min(*y1),
                x1: x0.max(*x1),
                y1: y0.max(*y1),
            })
        })
        .unwrap_or_default()
}
