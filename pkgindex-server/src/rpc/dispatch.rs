//! Query command dispatch.
//!
//! The command table is closed: every supported method is a variant of
//! [`QueryCommand`] with typed arguments, decoded from the positional
//! parameters before anything touches the database.

use pkgindex_core::{QueryService, SearchOperator, SearchSpec};
use tracing::{debug, error, warn};

use super::{Fault, MethodCall, Value, INTERNAL_ERROR, METHOD_NOT_FOUND};

/// A decoded query call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryCommand {
    ListPackages,
    PackageReleases { name: String, show_hidden: bool },
    ReleaseUrls { name: String, version: String },
    ReleaseData { name: String, version: String },
    Search { spec: SearchSpec },
}

/// Outcome of one call.
#[derive(Debug, Clone, PartialEq)]
pub enum RpcResponse {
    Success(Value),
    Fault(Fault),
}

impl QueryCommand {
    /// Method names, in the order they are advertised.
    pub const NAMES: [&'static str; 5] = [
        "list_packages",
        "package_releases",
        "release_urls",
        "release_data",
        "search",
    ];

    /// Look up `call.method` and decode its arguments.
    pub fn parse(call: &MethodCall) -> Result<Self, Fault> {
        let args = Args {
            method: &call.method,
            params: &call.params,
        };

        match call.method.as_str() {
            "list_packages" => {
                args.arity(0, 0)?;
                Ok(QueryCommand::ListPackages)
            }
            "package_releases" => {
                args.arity(1, 2)?;
                Ok(QueryCommand::PackageReleases {
                    name: args.string(0)?,
                    show_hidden: args.optional_bool(1)?.unwrap_or(false),
                })
            }
            "release_urls" => {
                args.arity(2, 2)?;
                Ok(QueryCommand::ReleaseUrls {
                    name: args.string(0)?,
                    version: args.string(1)?,
                })
            }
            "release_data" => {
                args.arity(2, 2)?;
                Ok(QueryCommand::ReleaseData {
                    name: args.string(0)?,
                    version: args.string(1)?,
                })
            }
            "search" => {
                args.arity(1, 2)?;
                let operator = match args.params.get(1) {
                    Some(_) => SearchOperator::parse(&args.string(1)?),
                    None => SearchOperator::Or,
                };
                Ok(QueryCommand::Search {
                    spec: search_spec(&args.params[0], operator)?,
                })
            }
            other => Err(Fault::new(
                METHOD_NOT_FOUND,
                format!(
                    "Method '{other}' is not allowed; supported methods: {}",
                    Self::NAMES.join(", ")
                ),
            )),
        }
    }

    /// Run the command. `download_base` is the absolute URL download paths
    /// are joined onto.
    pub async fn execute(
        self,
        queries: &QueryService,
        download_base: &str,
    ) -> pkgindex_core::Result<Value> {
        let value: Value = match self {
            QueryCommand::ListPackages => queries.list_packages().await?.into(),
            QueryCommand::PackageReleases { name, show_hidden } => {
                queries.package_releases(&name, show_hidden).await?.into()
            }
            QueryCommand::ReleaseUrls { name, version } => queries
                .release_urls(&name, &version, download_base)
                .await?
                .into(),
            QueryCommand::ReleaseData { name, version } => Value::Struct(
                queries
                    .release_data(&name, &version)
                    .await?
                    .into_iter()
                    .map(|(key, value)| (key, value.into()))
                    .collect(),
            ),
            QueryCommand::Search { spec } => queries.search(&spec).await?.into(),
        };

        Ok(value)
    }
}

/// Decode, run and wrap one call.
pub async fn dispatch(call: &MethodCall, queries: &QueryService, download_base: &str) -> RpcResponse {
    let command = match QueryCommand::parse(call) {
        Ok(command) => command,
        Err(fault) => {
            warn!(method = %call.method, code = fault.code, "Rejected query call");
            return RpcResponse::Fault(fault);
        }
    };
    debug!(?command, "Dispatching query");

    match command.execute(queries, download_base).await {
        Ok(value) => RpcResponse::Success(value),
        Err(e) => {
            error!(method = %call.method, error = %e, "Query failed");
            RpcResponse::Fault(Fault::new(INTERNAL_ERROR, "Internal server error"))
        }
    }
}

struct Args<'a> {
    method: &'a str,
    params: &'a [Value],
}

impl Args<'_> {
    fn arity(&self, min: usize, max: usize) -> Result<(), Fault> {
        let count = self.params.len();
        if count < min || count > max {
            let expected = if min == max {
                min.to_string()
            } else {
                format!("{min} to {max}")
            };
            return Err(Fault::invalid_params(format!(
                "{} takes {expected} arguments, {count} given",
                self.method
            )));
        }
        Ok(())
    }

    fn string(&self, index: usize) -> Result<String, Fault> {
        match self.params.get(index) {
            Some(Value::String(s)) => Ok(s.clone()),
            Some(other) => Err(self.wrong_type(index, "string", other)),
            None => Err(Fault::invalid_params(format!(
                "{} is missing argument {}",
                self.method,
                index + 1
            ))),
        }
    }

    fn optional_bool(&self, index: usize) -> Result<Option<bool>, Fault> {
        match self.params.get(index) {
            None => Ok(None),
            Some(value) => value
                .as_bool()
                .map(Some)
                .ok_or_else(|| self.wrong_type(index, "boolean", value)),
        }
    }

    fn wrong_type(&self, index: usize, expected: &str, found: &Value) -> Fault {
        Fault::invalid_params(format!(
            "{} argument {} must be a {expected}, not {}",
            self.method,
            index + 1,
            found.type_name()
        ))
    }
}

fn search_spec(value: &Value, operator: SearchOperator) -> Result<SearchSpec, Fault> {
    let members = value
        .as_struct()
        .ok_or_else(|| Fault::invalid_params("search spec must be a struct"))?;

    let terms = |key: &str| -> Result<Vec<String>, Fault> {
        match members.get(key) {
            None => Ok(Vec::new()),
            Some(value) => value.as_string_list().ok_or_else(|| {
                Fault::invalid_params(format!(
                    "search spec '{key}' must be a string or a list of strings"
                ))
            }),
        }
    };

    Ok(SearchSpec {
        names: terms("name")?,
        summaries: terms("summary")?,
        operator,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::{INVALID_PARAMS, METHOD_NOT_FOUND};
    use indexmap::IndexMap;

    fn call(method: &str, params: Vec<Value>) -> MethodCall {
        MethodCall {
            method: method.to_string(),
            params,
        }
    }

    #[test]
    fn test_parse_known_commands() {
        assert_eq!(
            QueryCommand::parse(&call("list_packages", vec![])),
            Ok(QueryCommand::ListPackages)
        );
        assert_eq!(
            QueryCommand::parse(&call("package_releases", vec!["foo".into()])),
            Ok(QueryCommand::PackageReleases {
                name: "foo".to_string(),
                show_hidden: false
            })
        );
        assert_eq!(
            QueryCommand::parse(&call(
                "package_releases",
                vec!["foo".into(), Value::Int(1)]
            )),
            Ok(QueryCommand::PackageReleases {
                name: "foo".to_string(),
                show_hidden: true
            })
        );
        assert_eq!(
            QueryCommand::parse(&call("release_data", vec!["foo".into(), "1.0".into()])),
            Ok(QueryCommand::ReleaseData {
                name: "foo".to_string(),
                version: "1.0".to_string()
            })
        );
    }

    #[test]
    fn test_unknown_method_lists_supported_names() {
        let fault = QueryCommand::parse(&call("changelog", vec![Value::Int(0)])).unwrap_err();

        assert_eq!(fault.code, METHOD_NOT_FOUND);
        for name in QueryCommand::NAMES {
            assert!(fault.message.contains(name), "{}", fault.message);
        }
    }

    #[test]
    fn test_argument_errors() {
        let fault = QueryCommand::parse(&call("release_urls", vec!["foo".into()])).unwrap_err();
        assert_eq!(fault.code, INVALID_PARAMS);

        let fault =
            QueryCommand::parse(&call("release_urls", vec!["foo".into(), Value::Int(1)]))
                .unwrap_err();
        assert_eq!(fault.code, INVALID_PARAMS);
        assert!(fault.message.contains("not int"));

        let fault = QueryCommand::parse(&call("list_packages", vec!["x".into()])).unwrap_err();
        assert_eq!(fault.code, INVALID_PARAMS);
    }

    #[test]
    fn test_search_spec_decoding() {
        let mut spec = IndexMap::new();
        spec.insert("name".to_string(), Value::from(vec!["foo", "bar"]));
        spec.insert("summary".to_string(), Value::from("xml"));
        spec.insert("description".to_string(), Value::from("ignored"));

        let command =
            QueryCommand::parse(&call("search", vec![Value::Struct(spec), "and".into()])).unwrap();

        assert_eq!(
            command,
            QueryCommand::Search {
                spec: SearchSpec {
                    names: vec!["foo".to_string(), "bar".to_string()],
                    summaries: vec!["xml".to_string()],
                    operator: SearchOperator::And,
                }
            }
        );

        let fault = QueryCommand::parse(&call("search", vec!["foo".into()])).unwrap_err();
        assert_eq!(fault.code, INVALID_PARAMS);
    }
}
