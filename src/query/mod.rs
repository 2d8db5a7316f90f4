//! Query Builder - turns request options into a canonical URL.
//!
//! Pure string building: no state, no percent-encoding. Parameters are always
//! emitted in the same order (filters, sort, include, fields, raw params) so
//! that equal options always produce equal URLs, which the request cache relies
//! on.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::document::Id;
use crate::transport::Headers;

/// How array-valued filter values are serialized.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ParamArrayType {
    /// `filter[a]=1,2`
    #[default]
    CommaSeparated,
    /// `filter[a]=1&filter[a]=2`
    MultipleParams,
    /// `filter[a][]=1&filter[a][]=2`
    ParamArray,
    /// `filter[a.0]=1&filter[a.1]=2`
    ObjectPath,
}

/// A raw query parameter appended verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryParam {
    Raw(String),
    KeyValue { key: String, value: String },
}

impl QueryParam {
    fn render(&self) -> String {
        match self {
            QueryParam::Raw(raw) => raw.clone(),
            QueryParam::KeyValue { key, value } => format!("{}={}", key, value),
        }
    }
}

/// Per-request options: headers plus the JSON:API query members.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestOptions {
    pub headers: Headers,
    pub filter: Map<String, Value>,
    pub sort: Vec<String>,
    pub include: Vec<String>,
    pub fields: BTreeMap<String, Vec<String>>,
    pub params: Vec<QueryParam>,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_filter(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter.insert(key.into(), value.into());
        self
    }

    pub fn with_sort(mut self, field: impl Into<String>) -> Self {
        self.sort.push(field.into());
        self
    }

    pub fn with_include(mut self, path: impl Into<String>) -> Self {
        self.include.push(path.into());
        self
    }

    pub fn with_fields<I, S>(mut self, resource_type: impl Into<String>, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields
            .entry(resource_type.into())
            .or_default()
            .extend(fields.into_iter().map(Into::into));
        self
    }

    pub fn with_raw_param(mut self, raw: impl Into<String>) -> Self {
        self.params.push(QueryParam::Raw(raw.into()));
        self
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push(QueryParam::KeyValue {
            key: key.into(),
            value: value.into(),
        });
        self
    }
}

fn scalar(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn parametrize(params: &Map<String, Value>, scope: &str, out: &mut Vec<(String, Value)>) {
    for (key, value) in params {
        match value {
            Value::Object(nested) => {
                parametrize(nested, &format!("{}{}.", scope, key), out);
            }
            other => out.push((format!("{}{}", scope, key), other.clone())),
        }
    }
}

/// `filter[...]` parameters, nested objects flattened to dotted keys.
pub fn prepare_filters(filter: &Map<String, Value>, array_type: ParamArrayType) -> Vec<String> {
    let mut flat = Vec::new();
    parametrize(filter, "", &mut flat);

    let mut list = Vec::with_capacity(flat.len());
    for (key, value) in flat {
        match value {
            Value::Array(items) => match array_type {
                ParamArrayType::CommaSeparated => {
                    let joined: Vec<String> = items.iter().map(scalar).collect();
                    list.push(format!("filter[{}]={}", key, joined.join(",")));
                }
                ParamArrayType::MultipleParams => {
                    list.extend(items.iter().map(|v| format!("filter[{}]={}", key, scalar(v))));
                }
                ParamArrayType::ParamArray => {
                    list.extend(items.iter().map(|v| format!("filter[{}][]={}", key, scalar(v))));
                }
                ParamArrayType::ObjectPath => {
                    list.extend(
                        items
                            .iter()
                            .enumerate()
                            .map(|(i, v)| format!("filter[{}.{}]={}", key, i, scalar(v))),
                    );
                }
            },
            other => list.push(format!("filter[{}]={}", key, scalar(&other))),
        }
    }
    list
}

pub fn prepare_sort(sort: &[String]) -> Vec<String> {
    if sort.is_empty() {
        return Vec::new();
    }
    vec![format!("sort={}", sort.join(","))]
}

pub fn prepare_includes(include: &[String]) -> Vec<String> {
    if include.is_empty() {
        return Vec::new();
    }
    vec![format!("include={}", include.join(","))]
}

pub fn prepare_fields(fields: &BTreeMap<String, Vec<String>>) -> Vec<String> {
    fields
        .iter()
        .map(|(resource_type, list)| format!("fields[{}]={}", resource_type, list.join(",")))
        .collect()
}

/// Prepend the base URL unless `url` is already absolute.
pub fn prefix_url(base_url: &str, url: &str) -> String {
    if url.contains("://") {
        url.to_string()
    } else {
        format!("{}{}", base_url, url)
    }
}

pub fn append_params(url: &str, params: &[String]) -> String {
    if params.is_empty() {
        return url.to_string();
    }
    let separator = if url.contains('?') { '&' } else { '?' };
    format!("{}{}{}", url, separator, params.join("&"))
}

/// Canonical request URL for `path` (and optionally one `id`) with `options`.
pub fn build_url(
    base_url: &str,
    path: &str,
    id: Option<&Id>,
    options: Option<&RequestOptions>,
    array_type: ParamArrayType,
) -> String {
    let url = match id {
        Some(id) => format!("{}/{}", path, id),
        None => path.to_string(),
    };

    let mut params = Vec::new();
    if let Some(options) = options {
        params.extend(prepare_filters(&options.filter, array_type));
        params.extend(prepare_sort(&options.sort));
        params.extend(prepare_includes(&options.include));
        params.extend(prepare_fields(&options.fields));
        params.extend(options.params.iter().map(QueryParam::render));
    }

    append_params(&prefix_url(base_url, &url), &params)
}
