//! Permission catalog - 플러그인 권한 어휘
//!
//! 런타임은 권한을 강제하지 않습니다. 설치 전에 요청 권한을 빠짐없이
//! 사람이 읽을 수 있는 형태로 보여주는 것까지가 역할입니다.

use serde::Serialize;

/// (키, 설명, 민감 여부)
const CATALOG: &[(&str, &str, bool)] = &[
    ("notes:read", "Read your notes", false),
    ("notes:write", "Create, edit and delete your notes", true),
    ("todos:read", "Read your todos", false),
    ("todos:write", "Create, edit and complete your todos", true),
    ("tags:read", "Read tags", false),
    ("tags:write", "Create, rename and delete tags", false),
    ("storage", "Store private plugin data on this device", false),
    ("clipboard:read", "Read the contents of the clipboard", true),
    ("clipboard:write", "Write to the clipboard", false),
    ("filesystem:read", "Read files you choose on this device", true),
    ("filesystem:write", "Write files you choose on this device", true),
    ("network", "Connect to the internet", true),
    ("scheduler", "Run actions on a schedule in the background", false),
    ("events", "Receive application events", false),
    ("ui:commands", "Add commands to toolbars and the command palette", false),
    ("ui:windows", "Open its own windows", false),
    ("ui:theme", "Change the look of the application", false),
];

/// 권한 설명
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PermissionInfo {
    pub key: String,
    pub description: String,
    /// 카탈로그에 있는 키인지
    pub recognized: bool,
    pub sensitive: bool,
}

impl PermissionInfo {
    /// 한 줄 표시 문자열
    pub fn render(&self) -> String {
        match (self.recognized, self.sensitive) {
            (false, _) => format!("{} (unrecognized permission)", self.key),
            (true, true) => format!("{}: {} [sensitive]", self.key, self.description),
            (true, false) => format!("{}: {}", self.key, self.description),
        }
    }
}

/// 단일 권한 설명 조회
///
/// 알 수 없는 키도 버리지 않고 그대로 표시합니다.
pub fn describe(key: &str) -> PermissionInfo {
    match CATALOG.iter().find(|(k, _, _)| *k == key) {
        Some((k, description, sensitive)) => PermissionInfo {
            key: (*k).to_string(),
            description: (*description).to_string(),
            recognized: true,
            sensitive: *sensitive,
        },
        None => PermissionInfo {
            key: key.to_string(),
            description: key.to_string(),
            recognized: false,
            sensitive: true,
        },
    }
}

/// 요청 순서대로 모든 권한 설명
pub fn describe_all<S: AsRef<str>>(keys: &[S]) -> Vec<PermissionInfo> {
    keys.iter().map(|k| describe(k.as_ref())).collect()
}
