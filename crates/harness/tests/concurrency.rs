use std::collections::BTreeSet;
use std::thread;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use formstore_core::{FieldType, FieldValue, FormField, ResourceId};
use formstore_harness::{SharedDb, TestWorkspace, init_tracing};

type TestResult = Result<(), Box<dyn std::error::Error>>;

const WRITERS: usize = 4;
const WRITES_PER_WRITER: usize = 25;

#[test]
fn concurrent_writers_never_share_a_version() -> TestResult {
    init_tracing();
    let db = SharedDb::new()?;
    let workspace = db.open()?;
    assert_eq!(workspace.current_version()?, 1);

    let handles: Vec<_> = (0..WRITERS)
        .map(|writer| {
            let config = db.config();
            thread::spawn(move || -> Result<Vec<u64>, String> {
                let mut workspace = formstore_engine::Workspace::open(config).map_err(|e| e.to_string())?;
                let owner = ResourceId::new(format!("writer-{writer}"));
                let mut versions = Vec::with_capacity(WRITES_PER_WRITER);
                for i in 0..WRITES_PER_WRITER {
                    let folder = workspace
                        .create_root_folder(&owner, &format!("folder {i}"))
                        .map_err(|e| e.to_string())?;
                    let snapshots = workspace.snapshots(&owner, &folder).map_err(|e| e.to_string())?;
                    versions.extend(snapshots.iter().map(|s| s.version));
                }
                Ok(versions)
            })
        })
        .collect();

    let mut all = BTreeSet::new();
    for handle in handles {
        let versions = handle.join().map_err(|_| "writer panicked")??;
        // each writer observes a strictly increasing counter
        assert!(versions.windows(2).all(|w| w[0] < w[1]));
        for version in versions {
            assert!(all.insert(version), "version {version} assigned twice");
        }
    }
    assert_eq!(all.len(), WRITERS * WRITES_PER_WRITER);

    // two versions per root folder, on top of the initial one
    let expected = 1 + (WRITERS * WRITES_PER_WRITER * 2) as u64;
    assert_eq!(workspace.current_version()?, expected);
    assert!(all.iter().all(|v| *v <= expected));
    Ok(())
}

#[test]
fn random_mutation_sequences_keep_versions_monotonic() -> TestResult {
    let mut ws = TestWorkspace::on_disk()?;
    let form = ws.create_form(
        "Log",
        vec![
            FormField::new("n", "N", FieldType::Quantity { units: None }),
            FormField::new("note", "Note", FieldType::Text),
        ],
    )?;

    let mut rng = StdRng::seed_from_u64(0x5eed);
    let mut live: Vec<ResourceId> = Vec::new();
    let mut last = ws.workspace.current_version()?;

    for step in 0..200 {
        let version = match rng.gen_range(0..10) {
            0..=5 => {
                let id = ws.create_instance(
                    &form,
                    vec![("n", FieldValue::quantity(f64::from(step)))],
                )?;
                live.push(id);
                ws.workspace.current_version()?
            }
            6..=8 if !live.is_empty() => {
                let id = &live[rng.gen_range(0..live.len())];
                let mut resource = ws.workspace.get_resource(&ws.owner, id)?;
                resource.value.set("note", FieldValue::Text(format!("edit {step}")));
                ws.workspace.put_resource(&ws.owner, &resource)?
            }
            _ if !live.is_empty() => {
                let id = live.swap_remove(rng.gen_range(0..live.len()));
                ws.workspace.delete_resource(&ws.owner, &id)?
            }
            _ => continue,
        };
        assert!(version > last, "step {step}: {version} <= {last}");
        last = version;
    }

    let columns = ws.workspace.query(&formstore_engine::QueryRequest::new(
        form.id.clone(),
        ws.owner.clone(),
        ["n"],
    ))?;
    assert_eq!(columns.num_rows(), live.len());
    Ok(())
}
