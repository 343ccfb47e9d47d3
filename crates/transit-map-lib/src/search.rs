//! Route search across every system
//!
//! Each route becomes one document with an accent- and case-folded token
//! string. A query matches a document when every query word occurs in it; lower
//! sums of match positions rank first.

use crate::ids::{SystemId, Trip};
use crate::labels::Labeler;
use crate::model::RouteKind;
use crate::registry::RouteRegistry;
use crate::traditional::DisplayEntry;
use std::cmp::Ordering;

/// Results returned per query
pub const MAX_RESULTS: usize = 25;

/// A searchable route
#[derive(Debug, Clone, PartialEq)]
pub struct SearchDoc {
    pub system: SystemId,
    /// Leaf id to check when the result is picked
    pub id: String,
    pub label: String,
    tokens: String,
}

impl SearchDoc {
    fn new(system: SystemId, id: &str, label: String, words: &[&str]) -> Self {
        Self {
            system,
            id: id.to_string(),
            label,
            tokens: fold(&words.join(" ")),
        }
    }

    fn bias(&self) -> usize {
        match self.system {
            SystemId::Traditional => 3,
            SystemId::Metro => 1,
            _ => 0,
        }
    }
}

/// Lowercase and strip Spanish diacritics
pub fn fold(text: &str) -> String {
    text.chars()
        .flat_map(char::to_lowercase)
        .map(|c| match c {
            'á' | 'à' | 'ä' | 'â' => 'a',
            'é' | 'è' | 'ë' | 'ê' => 'e',
            'í' | 'ì' | 'ï' | 'î' => 'i',
            'ó' | 'ò' | 'ö' | 'ô' => 'o',
            'ú' | 'ù' | 'ü' | 'û' => 'u',
            'ñ' => 'n',
            other => other,
        })
        .collect()
}

#[derive(Debug, Clone, Default)]
pub struct SearchIndex {
    docs: Vec<SearchDoc>,
}

impl SearchIndex {
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn build(registry: &RouteRegistry, entries: &[DisplayEntry], labeler: &Labeler) -> Self {
        let mut docs = Vec::new();
        for system in registry.systems() {
            for route in system.routes() {
                let id = route.id.as_str();
                let name = route.name.as_str();
                let doc = match route.kind {
                    RouteKind::TrunkRegular | RouteKind::TrunkExpress => {
                        let kind = if route.kind == RouteKind::TrunkExpress {
                            "Expreso"
                        } else {
                            "Ruta regular"
                        };
                        let main = if name.is_empty() { format!("Servicio {}", id) } else { name.to_string() };
                        SearchDoc::new(
                            SystemId::Trunk,
                            id,
                            format!("{} · {} ({})", id, main, kind),
                            &[id, name, kind, "metropolitano", "troncal"],
                        )
                    }
                    RouteKind::Feeder(zone) => {
                        let main = if name.is_empty() { format!("Alimentador {}", id) } else { name.to_string() };
                        SearchDoc::new(
                            SystemId::Feeder,
                            id,
                            format!("{} · {} ({})", id, main, zone.label()),
                            &[id, name, zone.label(), "alimentador", "metropolitano"],
                        )
                    }
                    RouteKind::Corridor => SearchDoc::new(
                        SystemId::Corridor,
                        id,
                        format!("{} · {}", id, if name.is_empty() { "Corredor" } else { name }),
                        &[id, name, "corredor"],
                    ),
                    RouteKind::Metro => SearchDoc::new(
                        SystemId::Metro,
                        id,
                        format!("{} · {}", id, if name.is_empty() { "Metro de Lima" } else { name }),
                        &[id, name, "metro", "tren electrico"],
                    ),
                    // traditional documents come from display entries
                    RouteKind::Traditional => continue,
                };
                docs.push(doc);
            }
        }
        docs.extend(entries.iter().map(|e| traditional_doc(e, labeler)));
        tracing::debug!("Search index built with {} documents", docs.len());
        Self { docs }
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    /// Documents matching every query word, best first
    pub fn search(&self, query: &str) -> Vec<&SearchDoc> {
        let query = fold(query);
        let words: Vec<&str> = query.split_whitespace().collect();
        if words.is_empty() {
            return Vec::new();
        }
        let mut scored: Vec<(usize, &SearchDoc)> = self
            .docs
            .iter()
            .filter_map(|doc| {
                let positions = words
                    .iter()
                    .map(|w| doc.tokens.find(w))
                    .collect::<Option<Vec<usize>>>()?;
                Some((positions.iter().sum::<usize>() + doc.bias(), doc))
            })
            .collect();
        scored.sort_by(|a, b| match a.0.cmp(&b.0) {
            Ordering::Equal => a.1.label.cmp(&b.1.label),
            other => other,
        });
        scored.into_iter().take(MAX_RESULTS).map(|(_, d)| d).collect()
    }
}

fn traditional_doc(entry: &DisplayEntry, labeler: &Labeler) -> SearchDoc {
    let meta = labeler.metadata(&entry.id);
    let code = meta
        .map(|m| m.codigo_nuevo.as_str())
        .filter(|c| !c.is_empty())
        .unwrap_or(&entry.id);
    let alias = meta.and_then(|m| m.alias()).unwrap_or_default();
    let operator = meta.map(|m| m.empresa_operadora.as_str()).unwrap_or_default();
    let short = meta
        .and_then(|m| m.acronym())
        .or_else(|| meta.and_then(|m| m.operator()))
        .unwrap_or_default();
    let old_code = meta.map(|m| m.codigo_antiguo.as_str()).unwrap_or_default();

    let label = match (alias.is_empty(), short.is_empty()) {
        (false, false) => format!("{} – {} ({})", alias, short, code),
        (false, true) => format!("{} ({})", alias, code),
        (true, false) => format!("{} – {}", code, short),
        (true, true) if !entry.name.trim().is_empty() => entry.name.trim().to_string(),
        (true, true) => labeler.traditional_label(entry, Trip::Outbound).title,
    };
    SearchDoc::new(
        SystemId::Traditional,
        &entry.id,
        label,
        &[code, old_code, alias, operator, short, entry.name.as_str(), "transporte", "wikiroutes"],
    )
}
