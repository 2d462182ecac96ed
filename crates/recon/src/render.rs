//! Review documents: osmChange XML and a GeoJSON mirror of the plan.

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use quick_xml::escape::escape;
use serde_json::{json, Map, Value};

use crate::config::OutputConfig;
use crate::error::ReconError;
use crate::plan::{ChangePlan, PlannedNode};

pub const GENERATOR: &str = concat!("aedsync ", env!("CARGO_PKG_VERSION"));

// ---------------------------------------------------------------------------
// osmChange
// ---------------------------------------------------------------------------

fn push_node(out: &mut String, node: &PlannedNode, version: u64, changeset: Option<u64>) {
    write!(
        out,
        r#"    <node id="{}" lat="{}" lon="{}" version="{version}""#,
        node.id, node.lat, node.lon
    )
    .ok();
    if let Some(cs) = changeset {
        write!(out, r#" changeset="{cs}""#).ok();
    }
    if node.tags.is_empty() {
        out.push_str("/>\n");
        return;
    }
    out.push_str(">\n");
    for (k, v) in node.tags.iter() {
        writeln!(out, r#"      <tag k="{}" v="{}"/>"#, escape(k), escape(v)).ok();
    }
    out.push_str("    </node>\n");
}

/// Render the plan as an osmChange 0.6 document. With `changeset` set, every
/// node carries the changeset attribute the write API requires.
pub fn render_osc(plan: &ChangePlan, changeset: Option<u64>) -> String {
    let mut out = String::new();
    out.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    writeln!(out, r#"<osmChange version="0.6" generator="{GENERATOR}">"#).ok();

    if !plan.create.is_empty() {
        out.push_str("  <create>\n");
        for c in &plan.create {
            push_node(&mut out, &c.node, c.node.version.unwrap_or(0), changeset);
        }
        out.push_str("  </create>\n");
    }
    if !plan.modify.is_empty() {
        out.push_str("  <modify>\n");
        for m in &plan.modify {
            let version = m.after.version.or(m.before.version).unwrap_or(1);
            push_node(&mut out, &m.after, version, changeset);
        }
        out.push_str("  </modify>\n");
    }
    if !plan.delete.is_empty() {
        out.push_str("  <delete if-unused=\"true\">\n");
        for d in &plan.delete {
            push_node(&mut out, &d.node, d.node.version.unwrap_or(1), changeset);
        }
        out.push_str("  </delete>\n");
    }

    out.push_str("</osmChange>\n");
    out
}

// ---------------------------------------------------------------------------
// GeoJSON
// ---------------------------------------------------------------------------

fn feature(operation: &str, register_ref: &str, node: &PlannedNode, from: Option<&PlannedNode>) -> Value {
    let mut props = Map::new();
    props.insert("_operation".into(), json!(operation));
    props.insert("_register_id".into(), json!(register_ref));
    props.insert("_osm_id".into(), json!(node.id));
    if let Some(before) = from {
        props.insert("_from_lat".into(), json!(before.lat));
        props.insert("_from_lon".into(), json!(before.lon));
    }
    for (k, v) in node.tags.iter() {
        props.insert(k.to_string(), json!(v));
    }
    json!({
        "type": "Feature",
        "geometry": { "type": "Point", "coordinates": [node.lon, node.lat] },
        "properties": props,
    })
}

pub fn render_geojson(plan: &ChangePlan) -> Value {
    let mut features = Vec::with_capacity(plan.counts().total());
    for c in &plan.create {
        features.push(feature("create", &c.register_ref, &c.node, None));
    }
    for m in &plan.modify {
        features.push(feature("modify", &m.register_ref, &m.after, Some(&m.before)));
    }
    for d in &plan.delete {
        features.push(feature("delete", &d.register_ref, &d.node, None));
    }
    json!({ "type": "FeatureCollection", "features": features })
}

// ---------------------------------------------------------------------------
// Files
// ---------------------------------------------------------------------------

/// Write via a sibling temp file and rename, creating parent directories.
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), ReconError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .map_err(|e| ReconError::Io(format!("create {}: {e}", parent.display())))?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    fs::write(&tmp, contents).map_err(|e| ReconError::Io(format!("write {}: {e}", tmp.display())))?;
    fs::rename(&tmp, path).map_err(|e| ReconError::Io(format!("rename to {}: {e}", path.display())))?;
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewFiles {
    pub osc: PathBuf,
    pub geojson: PathBuf,
}

pub fn write_review_files(plan: &ChangePlan, output: &OutputConfig) -> Result<ReviewFiles, ReconError> {
    write_atomic(&output.osc_path, render_osc(plan, None).as_bytes())?;
    let geojson = serde_json::to_string_pretty(&render_geojson(plan))
        .map_err(|e| ReconError::Serialize(e.to_string()))?;
    write_atomic(&output.geojson_path, geojson.as_bytes())?;
    log::info!(
        "wrote {} and {}",
        output.osc_path.display(),
        output.geojson_path.display()
    );
    Ok(ReviewFiles {
        osc: output.osc_path.clone(),
        geojson: output.geojson_path.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::{PlannedCreate, PlannedDelete, PlannedModify};
    use crate::tags::{TagUpdates, Tags};

    fn pn(id: i64, version: Option<u64>, tags: &[(&str, &str)]) -> PlannedNode {
        PlannedNode {
            id,
            lat: 59.5,
            lon: 10.25,
            version,
            tags: tags.iter().copied().collect::<Tags>(),
        }
    }

    fn sample_plan() -> ChangePlan {
        let before = pn(7, Some(4), &[("emergency", "defibrillator")]);
        let mut after = pn(7, Some(4), &[("emergency", "defibrillator"), ("name", "Kafé \"Sol\" & <Bar>")]);
        after.lat = 59.6;
        let mut updates = TagUpdates::default();
        updates.set("name", "Kafé \"Sol\" & <Bar>");
        ChangePlan {
            create: vec![PlannedCreate {
                register_ref: "g-1".into(),
                node: pn(-1, None, &[("name", "Ola's"), ("emergency", "defibrillator")]),
            }],
            modify: vec![PlannedModify {
                register_ref: "g-2".into(),
                before,
                after,
                tag_updates: updates,
            }],
            delete: vec![PlannedDelete {
                register_ref: "g-3".into(),
                node: pn(9, None, &[]),
            }],
        }
    }

    #[test]
    fn osc_sections_versions_and_escaping() {
        let osc = render_osc(&sample_plan(), None);
        assert!(osc.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<osmChange version=\"0.6\""));
        assert!(osc.contains(r#"<node id="-1" lat="59.5" lon="10.25" version="0">"#));
        assert!(osc.contains(r#"<node id="7" lat="59.6" lon="10.25" version="4">"#));
        assert!(osc.contains(r#"<delete if-unused="true">"#));
        assert!(osc.contains(r#"<node id="9" lat="59.5" lon="10.25" version="1"/>"#));
        assert!(osc.contains(r#"v="Ola&apos;s""#));
        assert!(osc.contains(r#"v="Kafé &quot;Sol&quot; &amp; &lt;Bar&gt;""#));
        assert!(!osc.contains("changeset="));
    }

    #[test]
    fn osc_tags_are_sorted() {
        let osc = render_osc(&sample_plan(), None);
        let emergency = osc.find(r#"k="emergency""#).unwrap();
        let name = osc.find(r#"k="name""#).unwrap();
        assert!(emergency < name);
    }

    #[test]
    fn osc_node_count_matches_plan() {
        let plan = sample_plan();
        let osc = render_osc(&plan, Some(42));
        assert_eq!(osc.matches("<node ").count(), plan.counts().total());
        assert_eq!(osc.matches(r#"changeset="42""#).count(), 3);
    }

    #[test]
    fn empty_plan_renders_bare_document() {
        let osc = render_osc(&ChangePlan::default(), None);
        assert!(!osc.contains("<create>"));
        assert!(osc.trim_end().ends_with("</osmChange>"));
        assert_eq!(render_geojson(&ChangePlan::default())["features"], json!([]));
    }

    #[test]
    fn geojson_mirrors_plan() {
        let doc = render_geojson(&sample_plan());
        let features = doc["features"].as_array().unwrap();
        assert_eq!(features.len(), 3);
        assert_eq!(features[0]["properties"]["_operation"], "create");
        assert_eq!(features[0]["geometry"]["coordinates"], json!([10.25, 59.5]));
        let modify = &features[1]["properties"];
        assert_eq!(modify["_operation"], "modify");
        assert_eq!(modify["_register_id"], "g-2");
        assert_eq!(modify["_osm_id"], 7);
        assert_eq!(modify["_from_lat"], 59.5);
        assert_eq!(modify["emergency"], "defibrillator");
        assert!(features[2]["properties"].get("_from_lat").is_none());
    }

    #[test]
    fn review_files_are_written_atomically() {
        let dir = tempfile::tempdir().unwrap();
        let output = OutputConfig {
            osc_path: dir.path().join("nested/out.osc"),
            geojson_path: dir.path().join("nested/out.geojson"),
        };
        let files = write_review_files(&sample_plan(), &output).unwrap();
        let osc = fs::read_to_string(&files.osc).unwrap();
        assert!(osc.contains("<modify>"));
        let geojson: Value = serde_json::from_str(&fs::read_to_string(&files.geojson).unwrap()).unwrap();
        assert_eq!(geojson["type"], "FeatureCollection");
        assert!(!dir.path().join("nested/out.osc.tmp").exists());
    }
}
