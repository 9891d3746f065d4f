// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

//! Link and form extraction from HTML documents

use html5ever::parse_document;
use html5ever::tendril::TendrilSink;
use html5ever::tree_builder::TreeBuilderOpts;
use html5ever::ParseOpts;
use markup5ever_rcdom::{Handle, NodeData, RcDom};

/// An `<input>` (or similar field) inside a form
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormInput {
    pub name: String,
    pub input_type: String,
    pub value: String,
}

/// A `<form>` element as extracted from a page
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ExtractedForm {
    /// The `action` attribute, possibly relative; empty means self-submit
    pub action: String,
    /// Uppercased method, GET when unspecified
    pub method: String,
    /// Nested input fields
    pub inputs: Vec<FormInput>,
}

/// Everything the spider wants from one document
#[derive(Debug, Clone, Default)]
pub struct ExtractedPage {
    /// Raw href/src values, in document order
    pub links: Vec<String>,
    /// Forms with their fields
    pub forms: Vec<ExtractedForm>,
}

/// Parse an HTML document and pull out links and forms.
///
/// html5ever recovers from arbitrary tag soup, so this never fails; an
/// unparseable document simply yields nothing.
pub fn extract_page(html: &str) -> ExtractedPage {
    let opts = ParseOpts {
        tree_builder: TreeBuilderOpts {
            drop_doctype: true,
            ..Default::default()
        },
        ..Default::default()
    };
    let dom = parse_document(RcDom::default(), opts)
        .from_utf8()
        .read_from(&mut html.as_bytes())
        .unwrap_or_default();

    let mut page = ExtractedPage::default();
    walk(&dom.document, &mut page, None);
    page
}

/// Which attribute carries a URL per tag
fn url_attribute(tag: &str) -> Option<&'static str> {
    match tag {
        "a" | "link" => Some("href"),
        "script" | "img" | "iframe" => Some("src"),
        _ => None,
    }
}

fn attribute(attrs: &[html5ever::Attribute], name: &str) -> Option<String> {
    attrs
        .iter()
        .find(|a| a.name.local.as_ref() == name)
        .map(|a| a.value.to_string())
}

fn walk(handle: &Handle, page: &mut ExtractedPage, form_index: Option<usize>) {
    let mut child_form = form_index;

    if let NodeData::Element {
        ref name,
        ref attrs,
        ..
    } = handle.data
    {
        let tag = name.local.as_ref();
        let attrs = attrs.borrow();

        if let Some(attr) = url_attribute(tag) {
            if let Some(value) = attribute(&attrs, attr) {
                if !value.trim().is_empty() {
                    page.links.push(value.trim().to_string());
                }
            }
        }

        match tag {
            "form" => {
                page.forms.push(ExtractedForm {
                    action: attribute(&attrs, "action").unwrap_or_default(),
                    method: attribute(&attrs, "method")
                        .unwrap_or_else(|| "get".to_string())
                        .to_uppercase(),
                    inputs: Vec::new(),
                });
                child_form = Some(page.forms.len() - 1);
            }
            "input" | "textarea" | "select" => {
                if let Some(idx) = form_index {
                    let input = FormInput {
                        name: attribute(&attrs, "name").unwrap_or_default(),
                        input_type: attribute(&attrs, "type").unwrap_or_else(|| {
                            if tag == "input" {
                                "text".to_string()
                            } else {
                                tag.to_string()
                            }
                        }),
                        value: attribute(&attrs, "value").unwrap_or_default(),
                    };
                    page.forms[idx].inputs.push(input);
                }
            }
            _ => {}
        }
    }

    for child in handle.children.borrow().iter() {
        walk(child, page, child_form);
    }
}
