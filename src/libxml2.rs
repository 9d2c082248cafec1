//! LibXML2 FFI wrapper for parsing XML documents from memory.
//!
//! Parsing is hardened against XML external entity (XXE) attacks: every
//! parse runs with `XML_PARSE_NONET` and with the process-global external
//! entity loader swapped for one that refuses all loads. The loader swap
//! is not atomic with respect to other parses, so it is treated as a
//! critical section: a mutex serializes it and an RAII guard restores the
//! prior loader on every exit path, including panics and error returns.
//!
//! Errors are read from the per-parse parser context rather than a global
//! error handler; default stderr reporting is silenced with the
//! `NOERROR`/`NOWARNING` parse options. Any recorded error fails the
//! parse, even when libxml2 managed to produce a document.

use std::ffi::{CStr, c_void};
use std::fmt;
use std::marker::PhantomData;
use std::ptr;
use std::sync::{Mutex, MutexGuard, Once};

use libc::{c_char, c_int, c_ushort};

use crate::error::{Error, Result};

/// Global initialization flag for libxml2
///
/// libxml2's initialization functions are NOT thread-safe, so they are
/// protected with std::sync::Once and run exactly once.
static LIBXML2_INIT: Once = Once::new();

/// Serializes swaps of the process-global external entity loader.
static ENTITY_LOADER_LOCK: Mutex<()> = Mutex::new(());

// Parser option flags (xmlParserOption)
const XML_PARSE_NOERROR: c_int = 1 << 5;
const XML_PARSE_NOWARNING: c_int = 1 << 6;
const XML_PARSE_NONET: c_int = 1 << 11;

// Node type discriminants (xmlElementType)
const XML_ELEMENT_NODE: c_int = 1;
const XML_TEXT_NODE: c_int = 3;
const XML_CDATA_SECTION_NODE: c_int = 4;

/// Opaque libxml2 structures
#[repr(C)]
pub struct XmlDoc {
    _private: [u8; 0],
}

#[repr(C)]
pub struct XmlParserCtxt {
    _private: [u8; 0],
}

#[repr(C)]
pub struct XmlParserInput {
    _private: [u8; 0],
}

/// Prefix of the public `_xmlNode` layout, enough to walk the tree.
#[repr(C)]
pub struct XmlNode {
    pub _private: *mut c_void,
    pub type_: c_int,
    pub name: *const c_char,
    pub children: *mut XmlNode,
    pub last: *mut XmlNode,
    pub parent: *mut XmlNode,
    pub next: *mut XmlNode,
    pub prev: *mut XmlNode,
    pub doc: *mut XmlDoc,
    pub ns: *mut c_void,
    pub content: *mut c_char,
    pub properties: *mut c_void,
    pub ns_def: *mut c_void,
    pub psvi: *mut c_void,
    pub line: c_ushort,
    pub extra: c_ushort,
}

#[repr(C)]
pub struct XmlError {
    pub domain: c_int,
    pub code: c_int,
    pub message: *const c_char,
    pub level: c_int,
    pub file: *const c_char,
    pub line: c_int,
    pub str1: *const c_char,
    pub str2: *const c_char,
    pub str3: *const c_char,
    pub int1: c_int,
    pub int2: c_int,
    pub ctxt: *mut c_void,
    pub node: *mut c_void,
}

pub type XmlExternalEntityLoader = Option<
    unsafe extern "C" fn(
        url: *const c_char,
        id: *const c_char,
        ctxt: *mut XmlParserCtxt,
    ) -> *mut XmlParserInput,
>;

// External libxml2 FFI declarations
#[cfg_attr(target_os = "windows", link(name = "libxml2"))]
#[cfg_attr(not(target_os = "windows"), link(name = "xml2"))]
unsafe extern "C" {
    fn xmlInitParser();

    fn xmlNewParserCtxt() -> *mut XmlParserCtxt;
    fn xmlFreeParserCtxt(ctxt: *mut XmlParserCtxt);
    fn xmlCtxtReadMemory(
        ctxt: *mut XmlParserCtxt,
        buffer: *const c_char,
        size: c_int,
        url: *const c_char,
        encoding: *const c_char,
        options: c_int,
    ) -> *mut XmlDoc;
    fn xmlCtxtGetLastError(ctx: *mut c_void) -> *const XmlError;

    fn xmlFreeDoc(doc: *mut XmlDoc);
    fn xmlDocGetRootElement(doc: *const XmlDoc) -> *mut XmlNode;

    fn xmlGetExternalEntityLoader() -> XmlExternalEntityLoader;
    fn xmlSetExternalEntityLoader(loader: XmlExternalEntityLoader);
}

fn ensure_initialized() {
    LIBXML2_INIT.call_once(|| unsafe {
        xmlInitParser();
    });
}

/// Entity loader that refuses every external load.
unsafe extern "C" fn refuse_external_entity(
    _url: *const c_char,
    _id: *const c_char,
    _ctxt: *mut XmlParserCtxt,
) -> *mut XmlParserInput {
    ptr::null_mut()
}

/// Scoped swap of the process-global external entity loader.
///
/// Holds [`ENTITY_LOADER_LOCK`] for its whole lifetime and restores the
/// prior loader on drop, so the swap cannot leak past a parse no matter
/// how the parse exits.
struct EntityLoaderGuard {
    prior: XmlExternalEntityLoader,
    _lock: MutexGuard<'static, ()>,
}

impl EntityLoaderGuard {
    fn disable_loading() -> Self {
        let lock = ENTITY_LOADER_LOCK
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let prior = unsafe { xmlGetExternalEntityLoader() };
        unsafe { xmlSetExternalEntityLoader(Some(refuse_external_entity)) };
        EntityLoaderGuard { prior, _lock: lock }
    }
}

impl Drop for EntityLoaderGuard {
    fn drop(&mut self) {
        unsafe { xmlSetExternalEntityLoader(self.prior) };
    }
}

/// An immutable, owned XML document parsed from text.
pub struct XmlDocument {
    doc: *mut XmlDoc,
}

// Safety: the document is never mutated after parsing, and libxml2
// documents are safe to read from the owning thread after transfer.
unsafe impl Send for XmlDocument {}

impl XmlDocument {
    /// Parse a text blob into a document.
    ///
    /// External entity loading and parser network access are disabled
    /// for the duration of the parse. Fails with [`Error::XmlParse`] if
    /// the parser recorded any error, even a non-fatal one.
    pub fn parse(text: &str) -> Result<Self> {
        ensure_initialized();
        let _loader = EntityLoaderGuard::disable_loading();

        unsafe {
            let ctxt = xmlNewParserCtxt();
            if ctxt.is_null() {
                return Err(Error::XmlParse {
                    details: "failed to allocate parser context".to_string(),
                });
            }

            let doc = xmlCtxtReadMemory(
                ctxt,
                text.as_ptr() as *const c_char,
                text.len() as c_int,
                ptr::null(),
                ptr::null(),
                XML_PARSE_NONET | XML_PARSE_NOERROR | XML_PARSE_NOWARNING,
            );

            let details = recorded_error(ctxt);
            xmlFreeParserCtxt(ctxt);

            if let Some(details) = details {
                if !doc.is_null() {
                    xmlFreeDoc(doc);
                }
                return Err(Error::XmlParse { details });
            }
            if doc.is_null() {
                return Err(Error::XmlParse {
                    details: "document construction failed".to_string(),
                });
            }

            Ok(XmlDocument { doc })
        }
    }

    /// The document's root element, if one exists.
    pub fn root(&self) -> Option<XmlElement<'_>> {
        let node = unsafe { xmlDocGetRootElement(self.doc) };
        if node.is_null() {
            None
        } else {
            Some(XmlElement {
                node,
                _doc: PhantomData,
            })
        }
    }
}

impl fmt::Debug for XmlDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("XmlDocument").finish_non_exhaustive()
    }
}

impl Drop for XmlDocument {
    fn drop(&mut self) {
        if !self.doc.is_null() {
            unsafe {
                xmlFreeDoc(self.doc);
            }
            self.doc = ptr::null_mut();
        }
    }
}

/// Read the error recorded on a parser context, if any.
unsafe fn recorded_error(ctxt: *mut XmlParserCtxt) -> Option<String> {
    let error = unsafe { xmlCtxtGetLastError(ctxt as *mut c_void) };
    if error.is_null() {
        return None;
    }
    let message = unsafe { (*error).message };
    if message.is_null() {
        return Some(format!("parser error code {}", unsafe { (*error).code }));
    }
    let text = unsafe { CStr::from_ptr(message) };
    Some(text.to_string_lossy().trim().to_string())
}

/// Borrowed view of an element node inside an [`XmlDocument`].
#[derive(Clone, Copy)]
pub struct XmlElement<'doc> {
    node: *const XmlNode,
    _doc: PhantomData<&'doc XmlDocument>,
}

impl<'doc> XmlElement<'doc> {
    pub fn name(&self) -> String {
        let name = unsafe { (*self.node).name };
        if name.is_null() {
            String::new()
        } else {
            unsafe { CStr::from_ptr(name) }.to_string_lossy().into_owned()
        }
    }

    /// Direct child elements, in document order.
    pub fn children(&self) -> Vec<XmlElement<'doc>> {
        let mut out = Vec::new();
        let mut child = unsafe { (*self.node).children };
        while !child.is_null() {
            if unsafe { (*child).type_ } == XML_ELEMENT_NODE {
                out.push(XmlElement {
                    node: child,
                    _doc: PhantomData,
                });
            }
            child = unsafe { (*child).next };
        }
        out
    }

    pub fn find_child(&self, name: &str) -> Option<XmlElement<'doc>> {
        self.children().into_iter().find(|child| child.name() == name)
    }

    /// Concatenated direct text and CDATA content. Entity references are
    /// kept unexpanded and contribute nothing.
    pub fn text(&self) -> String {
        let mut out = String::new();
        let mut child = unsafe { (*self.node).children };
        while !child.is_null() {
            let kind = unsafe { (*child).type_ };
            if kind == XML_TEXT_NODE || kind == XML_CDATA_SECTION_NODE {
                let content = unsafe { (*child).content };
                if !content.is_null() {
                    out.push_str(&unsafe { CStr::from_ptr(content) }.to_string_lossy());
                }
            }
            child = unsafe { (*child).next };
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_document() {
        let doc = XmlDocument::parse("<root />").unwrap();
        let root = doc.root().unwrap();
        assert_eq!(root.name(), "root");
        assert!(root.children().is_empty());
        assert_eq!(root.text(), "");
    }

    #[test]
    fn test_parse_nested_elements() {
        let doc = XmlDocument::parse(
            "<project><title>Views</title><short_name>views</short_name></project>",
        )
        .unwrap();
        let root = doc.root().unwrap();
        assert_eq!(root.name(), "project");
        assert_eq!(root.children().len(), 2);
        let title = root.find_child("title").unwrap();
        assert_eq!(title.text(), "Views");
        assert!(root.find_child("missing").is_none());
    }

    #[test]
    fn test_parse_unclosed_tag_fails() {
        let err = XmlDocument::parse("<a>").unwrap_err();
        let message = err.to_string();
        assert!(message.starts_with("Unable to parse response body into XML:"));
    }

    #[test]
    fn test_parse_garbage_fails() {
        assert!(XmlDocument::parse("definitely not xml").is_err());
        assert!(XmlDocument::parse("").is_err());
    }

    #[test]
    fn test_builtin_entities_are_decoded() {
        let doc = XmlDocument::parse("<v>a &amp; b</v>").unwrap();
        assert_eq!(doc.root().unwrap().text(), "a & b");
    }

    #[test]
    fn test_external_entity_is_not_resolved() {
        let payload = r#"<?xml version="1.0"?>
<!DOCTYPE r [<!ENTITY ext SYSTEM "file:///etc/hostname">]>
<r>&ext;</r>"#;
        // Parsing succeeds but the reference stays unexpanded.
        for _ in 0..3 {
            let doc = XmlDocument::parse(payload).unwrap();
            let root = doc.root().unwrap();
            assert_eq!(root.name(), "r");
            assert_eq!(root.text(), "");
        }
    }

    #[test]
    fn test_document_debug_formatting() {
        // Debug is required for assertions like unwrap_err() on
        // Result<XmlDocument, _>.
        let doc = XmlDocument::parse("<root />").unwrap();
        assert!(format!("{:?}", doc).contains("XmlDocument"));
        let err: crate::error::Result<XmlDocument> = XmlDocument::parse("<a>");
        assert!(err.unwrap_err().to_string().contains("Unable to parse"));
    }

    #[test]
    fn test_failure_then_success() {
        assert!(XmlDocument::parse("<broken").is_err());
        let doc = XmlDocument::parse("<ok />").unwrap();
        assert_eq!(doc.root().unwrap().name(), "ok");
    }
}
