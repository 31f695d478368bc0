use crate::model::{NodeIds, Oid, ServerInfo, ServerType, DBMS_JOB_SCHEDULER_ID};
use crate::templates::template_path;

/// Where a node hangs in the object tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParentLevel {
    /// Directly below a database: `/<gid>/<sid>/<did>[/<oid>]`.
    Database,
    /// Below a schema: `/<gid>/<sid>/<did>/<scid>[/<oid>]`.
    Schema,
    /// Below the DBMS job scheduler: `/<gid>/<sid>/<did>[/<oid>]`, parent
    /// id fixed to [`DBMS_JOB_SCHEDULER_ID`].
    JobScheduler,
}

/// Template directory layout of an object kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateLayout {
    /// `<kind>/#<version>#`
    Plain,
    /// `<kind>/<server_type>/#<version>#`
    ByServerType,
}

/// Static description of one object type.
#[derive(Debug)]
pub struct NodeDef {
    pub node_type: &'static str,
    /// Label of the collection node, e.g. "Sequences".
    pub label: &'static str,
    /// Name used in messages, e.g. "Sequence".
    pub title: &'static str,
    pub parent: ParentLevel,
    /// Level whose modules are listed by the `children` verb.
    pub children: Option<ParentLevel>,
    /// Name of the id argument the templates expect, e.g. `seid`.
    pub id_name: &'static str,
    pub template_kind: &'static str,
    pub layout: TemplateLayout,
    pub inode: bool,
    /// Empty means every server type.
    pub server_types: &'static [ServerType],
    pub min_version: u32,
    pub max_version: Option<u32>,
    /// DDL keyword used in reverse-engineered headers, e.g. "SEQUENCE".
    pub ddl_keyword: &'static str,
}

impl NodeDef {
    pub fn icon(&self) -> String {
        format!("icon-{}", self.node_type)
    }

    /// The "backend supported" rule: server type and version window.
    pub fn supports(&self, info: &ServerInfo) -> bool {
        if !self.server_types.is_empty() && !self.server_types.contains(&info.server_type) {
            return false;
        }
        if info.version < self.min_version {
            return false;
        }
        match self.max_version {
            Some(max) => info.version <= max,
            None => true,
        }
    }

    pub fn template_path(&self, info: &ServerInfo) -> String {
        self.template_path_for(self.template_kind, info)
    }

    /// Template directory of another kind laid out like this node's.
    pub fn template_path_for(&self, kind: &str, info: &ServerInfo) -> String {
        let server_type = match self.layout {
            TemplateLayout::Plain => None,
            TemplateLayout::ByServerType => Some(info.server_type),
        };
        template_path(kind, server_type, info.version)
    }

    /// Id of the tree entry objects of this type hang below.
    pub fn parent_id(&self, ids: &NodeIds) -> Oid {
        match self.parent {
            ParentLevel::Database => ids.did,
            ParentLevel::Schema => ids.parent_or_did(),
            ParentLevel::JobScheduler => DBMS_JOB_SCHEDULER_ID,
        }
    }

    /// Split the numeric url tail into ids. Returns `None` when the tail
    /// has the wrong length or a non-numeric segment.
    pub fn parse_ids(&self, segments: &[&str]) -> Option<NodeIds> {
        let numbers = segments
            .iter()
            .filter(|s| !s.is_empty())
            .map(|s| s.parse::<u32>().ok())
            .collect::<Option<Vec<_>>>()?;

        let prefix = match self.parent {
            ParentLevel::Schema => 4,
            ParentLevel::Database | ParentLevel::JobScheduler => 3,
        };
        if numbers.len() < prefix || numbers.len() > prefix + 1 {
            return None;
        }

        let mut ids = NodeIds::database(numbers[0], numbers[1], numbers[2]);
        if self.parent == ParentLevel::Schema {
            ids = ids.with_parent(numbers[3]);
        }
        if let Some(oid) = numbers.get(prefix) {
            ids = ids.with_oid(*oid);
        }
        Some(ids)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
}

impl HttpMethod {
    pub fn parse(method: &str) -> Option<Self> {
        match method {
            "GET" => Some(HttpMethod::Get),
            "POST" => Some(HttpMethod::Post),
            "PUT" => Some(HttpMethod::Put),
            "DELETE" => Some(HttpMethod::Delete),
            _ => None,
        }
    }
}

/// Whether a verb is reachable through the object url, the collection url
/// or both.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Object,
    Collection,
    Both,
}

impl Scope {
    fn allows(&self, has_oid: bool) -> bool {
        match self {
            Scope::Object => has_oid,
            Scope::Collection => !has_oid,
            Scope::Both => true,
        }
    }
}

/// A node specific action such as `refresh_data` or `get_lexize`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CustomOperation {
    pub action: &'static str,
    pub method: HttpMethod,
    pub scope: Scope,
}

impl CustomOperation {
    pub const fn new(action: &'static str, method: HttpMethod, scope: Scope) -> Self {
        Self {
            action,
            method,
            scope,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    List,
    Nodes,
    Node,
    Properties,
    Create,
    Update,
    Delete { cascade: bool },
    Msql,
    Sql,
    Dependents,
    Dependencies,
    Statistics,
    Children,
    Custom(&'static str),
}

/// Map an (action, method) pair onto a verb. The first column of the
/// routing table is the object url, the second the collection url.
pub fn resolve_verb(
    action: &str,
    method: HttpMethod,
    has_oid: bool,
    custom: &[CustomOperation],
) -> Option<Verb> {
    use HttpMethod::*;

    let verb = match (action, method, has_oid) {
        ("obj", Get, true) => Some(Verb::Properties),
        ("obj", Get, false) => Some(Verb::List),
        ("obj", Put, true) => Some(Verb::Update),
        ("obj", Post, false) => Some(Verb::Create),
        ("obj", Delete, _) => Some(Verb::Delete { cascade: false }),
        ("delete", Delete, _) => Some(Verb::Delete { cascade: true }),
        ("nodes", Get, true) => Some(Verb::Node),
        ("nodes", Get, false) => Some(Verb::Nodes),
        ("children", Get, true) => Some(Verb::Children),
        ("sql", Get, true) => Some(Verb::Sql),
        ("msql", Get, _) => Some(Verb::Msql),
        ("stats", Get, _) => Some(Verb::Statistics),
        ("dependency", Get, true) => Some(Verb::Dependencies),
        ("dependent", Get, true) => Some(Verb::Dependents),
        _ => None,
    };
    if verb.is_some() {
        return verb;
    }

    custom
        .iter()
        .find(|op| op.action == action && op.method == method && op.scope.allows(has_oid))
        .map(|op| Verb::Custom(op.action))
}

#[cfg(test)]
mod tests {
    use super::*;

    static SEQUENCE: NodeDef = NodeDef {
        node_type: "sequence",
        label: "Sequences",
        title: "Sequence",
        parent: ParentLevel::Schema,
        children: None,
        id_name: "seid",
        template_kind: "sequences",
        layout: TemplateLayout::Plain,
        inode: false,
        server_types: &[],
        min_version: 0,
        max_version: None,
        ddl_keyword: "SEQUENCE",
    };

    static JOB: NodeDef = NodeDef {
        node_type: "dbms_job",
        label: "DBMS Jobs",
        title: "Job",
        parent: ParentLevel::JobScheduler,
        children: None,
        id_name: "jsjobid",
        template_kind: "dbms_jobs",
        layout: TemplateLayout::ByServerType,
        inode: false,
        server_types: &[ServerType::Ppas],
        min_version: 90600,
        max_version: None,
        ddl_keyword: "JOB",
    };

    fn info(server_type: ServerType, version: u32) -> ServerInfo {
        ServerInfo {
            sid: 1,
            version,
            server_type,
        }
    }

    #[test]
    fn test_backend_supported() {
        assert!(SEQUENCE.supports(&info(ServerType::Pg, 90000)));
        assert!(!JOB.supports(&info(ServerType::Pg, 160000)));
        assert!(JOB.supports(&info(ServerType::Ppas, 160000)));
        assert!(!JOB.supports(&info(ServerType::Ppas, 90500)));
    }

    #[test]
    fn test_template_paths() {
        assert_eq!(
            SEQUENCE.template_path(&info(ServerType::Pg, 150002)),
            "sequences/#150002#"
        );
        assert_eq!(
            JOB.template_path(&info(ServerType::Ppas, 160000)),
            "dbms_jobs/ppas/#160000#"
        );
        assert_eq!(
            JOB.template_path_for("dbms_programs", &info(ServerType::Ppas, 160000)),
            "dbms_programs/ppas/#160000#"
        );
    }

    #[test]
    fn test_parse_ids() {
        let ids = SEQUENCE.parse_ids(&["1", "2", "13000", "2200", "16400"]).unwrap();
        assert_eq!(ids.parent, Some(2200));
        assert_eq!(ids.oid, Some(16400));

        let coll = SEQUENCE.parse_ids(&["1", "2", "13000", "2200", ""]).unwrap();
        assert_eq!(coll.oid, None);

        assert!(SEQUENCE.parse_ids(&["1", "2", "13000"]).is_none());
        assert!(SEQUENCE.parse_ids(&["1", "2", "x", "2200"]).is_none());

        let job = JOB.parse_ids(&["1", "2", "13000", "5"]).unwrap();
        assert_eq!(job.parent, None);
        assert_eq!(job.oid, Some(5));
        assert_eq!(JOB.parent_id(&job), DBMS_JOB_SCHEDULER_ID);
    }

    #[test]
    fn test_verb_table() {
        use HttpMethod::*;
        assert_eq!(resolve_verb("obj", Get, true, &[]), Some(Verb::Properties));
        assert_eq!(resolve_verb("obj", Get, false, &[]), Some(Verb::List));
        assert_eq!(resolve_verb("obj", Post, false, &[]), Some(Verb::Create));
        assert_eq!(resolve_verb("obj", Post, true, &[]), None);
        assert_eq!(
            resolve_verb("delete", Delete, false, &[]),
            Some(Verb::Delete { cascade: true })
        );
        assert_eq!(
            resolve_verb("obj", Delete, true, &[]),
            Some(Verb::Delete { cascade: false })
        );
        assert_eq!(resolve_verb("sql", Get, false, &[]), None);

        let custom = [CustomOperation::new("refresh_data", Put, Scope::Object)];
        assert_eq!(
            resolve_verb("refresh_data", Put, true, &custom),
            Some(Verb::Custom("refresh_data"))
        );
        assert_eq!(resolve_verb("refresh_data", Put, false, &custom), None);
        assert_eq!(resolve_verb("refresh_data", Get, true, &custom), None);
    }
}
