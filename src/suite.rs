//! The smoke-test battery run inside a fresh Python sandbox.

use std::time::Duration;
use tracing::{error, info, warn};

use crate::client::Sandbox;
use crate::execution::execute_code;

/// A named piece of Python source run sandbox-side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TestCase {
    pub name: &'static str,
    pub code: &'static str,
}

/// Default battery, in execution order.
pub const SMOKE_TESTS: &[TestCase] = &[
    TestCase {
        name: "Python environment",
        code: r#"
import sys
import os
print(f"Python version: {sys.version}")
print(f"Working directory: {os.getcwd()}")
print(f"Platform: {sys.platform}")
print(f"Executable: {sys.executable}")
"#,
    },
    TestCase {
        name: "Standard library",
        code: r#"
try:
    import json
    import datetime
    import urllib.request
    print("Standard library imports OK")

    data = {"test": "success", "timestamp": str(datetime.datetime.now())}
    json_str = json.dumps(data, indent=2)
    print(f"JSON: {json_str}")

except Exception as e:
    print(f"Standard library test failed: {e}")
"#,
    },
    TestCase {
        name: "Package install",
        code: r#"
import subprocess
import sys

try:
    print("Installing requests...")
    result = subprocess.run(
        [sys.executable, '-m', 'pip', 'install', 'requests==2.31.0'],
        capture_output=True, text=True, timeout=60
    )

    if result.returncode == 0:
        print("requests installed")
        import requests
        print(f"requests version: {requests.__version__}")
    else:
        print(f"Install failed: {result.stderr}")

except Exception as e:
    print(f"Package install test failed: {e}")
"#,
    },
    TestCase {
        name: "Network connectivity",
        code: r#"
try:
    import requests

    print("Testing network access...")
    response = requests.get('https://httpbin.org/ip', timeout=10)

    if response.status_code == 200:
        data = response.json()
        print("Network OK")
        print(f"External IP: {data.get('origin', 'unknown')}")
    else:
        print(f"Unexpected response: {response.status_code}")

except Exception as e:
    print(f"Network test failed: {e}")
"#,
    },
    TestCase {
        name: "Filesystem",
        code: r#"
import os
import tempfile

try:
    print("Testing filesystem access...")

    with tempfile.NamedTemporaryFile(mode='w', delete=False, suffix='.txt') as f:
        f.write("Hello from Daytona sandbox!")
        temp_file = f.name

    with open(temp_file, 'r') as f:
        content = f.read()

    print("File operations OK")
    print(f"Content: {content}")
    print(f"Temp file: {temp_file}")

    os.unlink(temp_file)
    print("Temp file removed")

except Exception as e:
    print(f"Filesystem test failed: {e}")
"#,
    },
];

/// Pass/fail tally of one suite run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SuiteReport {
    pub passed: usize,
    pub failed: usize,
}

impl SuiteReport {
    pub fn total(&self) -> usize {
        self.passed + self.failed
    }

    pub fn all_passed(&self) -> bool {
        self.failed == 0 && self.total() > 0
    }
}

/// Run `cases` sequentially against `sandbox`, pausing `delay` between
/// consecutive cases. Nothing is retried.
pub async fn run_suite(sandbox: &dyn Sandbox, cases: &[TestCase], delay: Duration) -> SuiteReport {
    info!("Running {} smoke tests...", cases.len());
    let total = cases.len();
    let mut report = SuiteReport {
        passed: 0,
        failed: 0,
    };

    for (i, case) in cases.iter().enumerate() {
        let n = i + 1;
        info!("Test {}/{}: {}", n, total, case.name);

        let result = execute_code(sandbox, case.code, case.name).await;
        if result.success {
            report.passed += 1;
            info!("Test {} passed", n);
        } else {
            report.failed += 1;
            error!("Test {} failed", n);
        }

        if n < total {
            tokio::time::sleep(delay).await;
        }
    }

    info!("Tests finished: {}/{} passed", report.passed, total);
    if report.all_passed() {
        info!("All tests passed, sandbox is fully functional");
    } else {
        warn!("{} test(s) failed", report.failed);
    }
    report
}
