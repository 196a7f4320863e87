//! Shell stand-ins for the compiler, generator and reducer, plus a matching configuration.

#![allow(dead_code)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use dredd_runner::WorkDir;
use dredd_runner::types::config::{
    CampaignConfig, CompilerConfig, Config, GeneratorConfig, PackageConfig, ReduceConfig,
};
use dredd_runner::types::{KillInfo, KillStatus, KillSummary, MutationId};
use tempfile::TempDir;

/// Compiles anything into a script printing 42. Mutation 3 crashes the compiler,
/// mutation 5 makes the program print 43, every other mutation has no effect.
/// The tracking build reports mutations 1, 3, 5 and 7 as covered.
const FAKE_COMPILER: &str = r#"#!/bin/sh
out=a.out
object=0
while [ $# -gt 0 ]; do
  case "$1" in
    -o) out="$2"; shift 2 ;;
    -c) object=1; shift ;;
    -I) shift 2 ;;
    *) shift ;;
  esac
done
if [ -n "$DREDD_MUTANT_TRACKING_FILE" ]; then
  printf '3\n1\n7\n5\n3\n' >> "$DREDD_MUTANT_TRACKING_FILE"
fi
value=42
case "$DREDD_ENABLED_MUTATION" in
  3)
    echo "fake-cc: lib/Fake.cpp:10: void fold(): Assertion \`x' failed." >&2
    exit 134 ;;
  5) value=43 ;;
esac
if [ "$object" = 1 ]; then
  echo "object" > "$out"
  exit 0
fi
printf '#!/bin/sh\necho %s\n' "$value" > "$out"
chmod +x "$out"
"#;

const FAKE_GENERATOR: &str = r#"#!/bin/sh
while [ $# -gt 0 ]; do
  case "$1" in
    -o) out="$2"; shift 2 ;;
    --seed) seed="$2"; shift 2 ;;
    *) shift ;;
  esac
done
echo "int main(void) { return 0; } /* seed $seed */" > "$out"
"#;

/// Runs the interestingness test once, the way a reducer would before shrinking anything.
const FAKE_REDUCER: &str = "#!/bin/sh\nexec \"$1\"\n";

const SLOW_REDUCER: &str = "#!/bin/sh\nsleep 30\n";

const MUTATION_INFO: &str = r#"{
  "infoForFiles": [
    {
      "filename": "lib/Fake.cpp",
      "mutationTreeRoot": {
        "children": [
          {"mutationGroups": [{"replaceExpr": {"instances": [{"mutationId": 0}, {"mutationId": 1}, {"mutationId": 2}]}}]},
          {"mutationGroups": [{"removeStmt": {"mutationId": 3}}]},
          {"mutationGroups": [{"replaceBinaryOperator": {"instances": [{"mutationId": 4}, {"mutationId": 5}, {"mutationId": 6}, {"mutationId": 7}]}}]}
        ]
      }
    }
  ]
}"#;

pub fn write_script(path: &Path, body: &str) {
    fs::write(path, body).unwrap();
    let mut permissions = fs::metadata(path).unwrap().permissions();
    permissions.set_mode(0o755);
    fs::set_permissions(path, permissions).unwrap();
}

pub struct Fixture {
    pub dir: TempDir,
}

impl Fixture {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let bin = dir.path().join("bin");
        fs::create_dir(&bin).unwrap();
        write_script(&bin.join("fake-cc"), FAKE_COMPILER);
        write_script(&bin.join("fake-csmith"), FAKE_GENERATOR);
        write_script(&bin.join("fake-reduce"), FAKE_REDUCER);
        write_script(&bin.join("slow-reduce"), SLOW_REDUCER);
        fs::write(dir.path().join("mutated.json"), MUTATION_INFO).unwrap();
        fs::write(dir.path().join("tracking.json"), MUTATION_INFO).unwrap();
        Self { dir }
    }

    pub fn tool(&self, name: &str) -> PathBuf {
        self.dir.path().join("bin").join(name)
    }

    pub fn work_path(&self) -> PathBuf {
        self.dir.path().join("work")
    }

    pub fn work(&self) -> WorkDir {
        WorkDir::new(self.work_path())
    }

    /// A compiler that always behaves like the mutant enabling `mutation`.
    pub fn mutant_compiler(&self, mutation: MutationId) -> PathBuf {
        let path = self.tool(&format!("mutant-{mutation}-cc"));
        write_script(
            &path,
            &format!(
                "#!/bin/sh\nDREDD_ENABLED_MUTATION={mutation} exec '{}' \"$@\"\n",
                self.tool("fake-cc").display()
            ),
        );
        path
    }

    pub fn config(&self) -> Config {
        let cc = self.tool("fake-cc");
        Config {
            work_dir: Some(self.work_path()),
            compiler: Some(CompilerConfig {
                mutated: Some(cc.clone()),
                tracking: Some(cc.clone()),
                mutation_info: Some(self.dir.path().join("mutated.json")),
                tracking_mutation_info: Some(self.dir.path().join("tracking.json")),
                sanitizer: Some(cc.display().to_string()),
                flags: Some(vec!["-O1".to_string()]),
            }),
            generator: Some(GeneratorConfig {
                path: Some(self.tool("fake-csmith")),
                timeout: Some(10),
                ..Default::default()
            }),
            campaign: Some(CampaignConfig {
                total_time: Some(120),
                max_time_since_last_kill: Some(0),
                max_programs: Some(1),
                seed: Some(1234),
                sanitizers: None,
            }),
            reduce: Some(ReduceConfig {
                reducer: Some(self.tool("fake-reduce")),
                timeout: Some(60),
            }),
            package: Some(PackageConfig {
                compilers: Some(vec![cc.display().to_string()]),
            }),
            ..Default::default()
        }
    }

    /// Record `test` as having killed each `(mutation, kill type)` pair, as a campaign would.
    pub fn record_test(&self, test: &str, files: &[(&str, &str)], kills: &[(MutationId, KillStatus)]) {
        let work = self.work();
        work.ensure_campaign_layout().unwrap();
        assert!(work.claim_test(test).unwrap().won());
        for (name, contents) in files {
            fs::write(work.test_dir(test).join(name), contents).unwrap();
        }
        let killed: Vec<MutationId> = kills.iter().map(|(id, _)| *id).collect();
        work.add_kill_summary(test, &KillSummary::new(killed.clone(), killed, vec![], vec![]))
            .unwrap();
        for (id, kill_type) in kills {
            assert!(work.claim_kill(*id).unwrap().won());
            work.add_kill_info(
                *id,
                &KillInfo {
                    killing_test: test.to_string(),
                    kill_type: *kill_type,
                },
            )
            .unwrap();
        }
    }
}

pub fn running() -> Arc<AtomicBool> {
    Arc::new(AtomicBool::new(true))
}
