//! Multipart form-data items.

/// One part of a `multipart/form-data` body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormDataItem {
    /// `name` option of `Content-Disposition`
    pub name: String,
    /// `filename` option of `Content-Disposition`, empty for plain fields
    pub file: String,
    /// Part `Content-Type`, empty when absent
    pub content_type: String,
    pub data: Vec<u8>,
}

impl FormDataItem {
    pub fn is_file(&self) -> bool {
        !self.file.is_empty()
    }

    /// Part data as text when it is valid UTF-8.
    pub fn text(&self) -> Option<&str> {
        std::str::from_utf8(&self.data).ok()
    }
}

/// Parts of a multipart body in wire order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormData {
    items: Vec<FormDataItem>,
}

impl FormData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, item: FormDataItem) {
        self.items.push(item);
    }

    /// First part with the given field name.
    pub fn get(&self, name: &str) -> Option<&FormDataItem> {
        self.items.iter().find(|item| item.name == name)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, FormDataItem> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}

impl std::ops::Index<usize> for FormData {
    type Output = FormDataItem;

    fn index(&self, index: usize) -> &Self::Output {
        &self.items[index]
    }
}
