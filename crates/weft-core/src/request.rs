//! Inbound request parameters and the buffered response abstraction.

use ahash::AHashMap;

/// Inbound request: method, path and decoded query/post values. The
/// servlet-level wrapping happens outside this crate.
#[derive(Clone, Debug, Default)]
pub struct Request {
    method: String,
    path: String,
    parameters: AHashMap<String, String>,
}

impl Request {
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Request {
            method: method.into(),
            path: path.into(),
            parameters: AHashMap::new(),
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Request::new("GET", path)
    }

    pub fn with_parameter(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.insert(name.into(), value.into());
        self
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn path_segments(&self) -> impl Iterator<Item = &str> {
        self.path.split('/').filter(|s| !s.is_empty())
    }

    pub fn parameter(&self, name: &str) -> Option<&str> {
        self.parameters.get(name).map(String::as_str)
    }

    pub fn parameters(&self) -> &AHashMap<String, String> {
        &self.parameters
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Cookie {
    pub name: String,
    pub value: String,
}

/// Buffered response. Writes accumulate until the cycle's detach step
/// flushes the buffer; a set redirect location supersedes the body.
#[derive(Default)]
pub struct Response {
    buffer: String,
    redirect_location: Option<String>,
    content_type: Option<String>,
    locale: Option<String>,
    cookies: Vec<Cookie>,
    flushed: bool,
}

impl Response {
    pub fn new() -> Self {
        Response::default()
    }

    pub fn write(&mut self, text: &str) {
        self.buffer.push_str(text);
    }

    pub fn body(&self) -> &str {
        &self.buffer
    }

    pub fn reset_buffer(&mut self) {
        self.buffer.clear();
    }

    pub fn redirect(&mut self, location: impl Into<String>) {
        self.redirect_location = Some(location.into());
    }

    pub fn is_redirect(&self) -> bool {
        self.redirect_location.is_some()
    }

    pub fn redirect_location(&self) -> Option<&str> {
        self.redirect_location.as_deref()
    }

    pub fn clear_redirect(&mut self) {
        self.redirect_location = None;
    }

    pub fn set_content_type(&mut self, content_type: impl Into<String>) {
        self.content_type = Some(content_type.into());
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    pub fn set_locale(&mut self, locale: impl Into<String>) {
        self.locale = Some(locale.into());
    }

    pub fn locale(&self) -> Option<&str> {
        self.locale.as_deref()
    }

    pub fn add_cookie(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.cookies.push(Cookie {
            name: name.into(),
            value: value.into(),
        });
    }

    pub fn cookies(&self) -> &[Cookie] {
        &self.cookies
    }

    /// Marks the buffered content as handed off to the outer layer.
    pub fn flush(&mut self) {
        self.flushed = true;
    }

    pub fn is_flushed(&self) -> bool {
        self.flushed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_segments_skip_empty_parts() {
        let request = Request::get("/page//home/");
        let segments: Vec<&str> = request.path_segments().collect();
        assert_eq!(segments, vec!["page", "home"]);
    }

    #[test]
    fn redirect_supersedes_body() {
        let mut response = Response::new();
        response.write("partial");
        response.redirect("/elsewhere");
        assert!(response.is_redirect());
        assert_eq!(response.redirect_location(), Some("/elsewhere"));
    }
}
