// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! URL query string codec.
//!
//! Encoding percent-escapes everything outside the RFC 3986 unreserved set
//! (space becomes `%20`). Decoding is lenient and never fails: `+` is a space,
//! bad escapes and invalid UTF-8 are kept lossily, and a segment without `=`
//! decodes to an empty value.

/// Decoded query parameters in the order they appeared.
///
/// Duplicate names are preserved; [`Query::get`] returns the first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Query(Vec<(String, String)>);

impl Query {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.iter().find(|(k, _)| k == name).map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_pairs(self) -> Vec<(String, String)> {
        self.0
    }
}

/// Encode `name=value` pairs joined with `&`, in caller order.
pub fn encode<K, V>(pairs: &[(K, V)]) -> String
where
    K: AsRef<str>,
    V: AsRef<str>,
{
    pairs
        .iter()
        .map(|(k, v)| {
            format!("{}={}", urlencoding::encode(k.as_ref()), urlencoding::encode(v.as_ref()))
        })
        .collect::<Vec<_>>()
        .join("&")
}

/// Decode a query string (without the leading `?`).
pub fn decode(query: &str) -> Query {
    let pairs = query
        .split('&')
        .filter(|segment| !segment.is_empty())
        .map(|segment| match segment.split_once('=') {
            Some((k, v)) => (unescape(k), unescape(v)),
            None => (unescape(segment), String::new()),
        })
        .collect();
    Query(pairs)
}

/// Decode the query part of a URL. A URL without `?` yields no parameters.
pub fn extract_query(url: &str) -> Query {
    let Some((_, rest)) = url.split_once('?') else {
        return Query::default();
    };
    let query = rest.split_once('#').map_or(rest, |(q, _)| q);
    decode(query)
}

fn unescape(s: &str) -> String {
    let spaced = s.replace('+', " ");
    String::from_utf8_lossy(&urlencoding::decode_binary(spaced.as_bytes())).into_owned()
}

#[cfg(test)]
#[path = "query_tests.rs"]
mod tests;
