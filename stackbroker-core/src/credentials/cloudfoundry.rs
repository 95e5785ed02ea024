//! Credential shapes expected by Cloud Foundry buildpacks.

use serde_json::Value;

use super::{CredentialError, Credentials};

/// Reshapes raw output credentials for well-known services. Services without
/// a known shape pass through unchanged.
pub fn reshape(service: &str, credentials: Credentials) -> Result<Credentials, CredentialError> {
    match service {
        "rdsmysql" | "rdsmariadb" => mysql(service, &credentials),
        "rdspostgresql" => postgresql(service, &credentials),
        "s3" => s3(service, credentials),
        _ => Ok(credentials),
    }
}

struct Fields<'a> {
    service: &'a str,
    credentials: &'a Credentials,
}

impl Fields<'_> {
    fn get(&self, field: &str) -> Result<String, CredentialError> {
        match self.credentials.get(field) {
            Some(Value::String(value)) => Ok(value.clone()),
            _ => Err(CredentialError::MissingField {
                service: self.service.to_string(),
                field: field.to_string(),
            }),
        }
    }
}

fn mysql(service: &str, credentials: &Credentials) -> Result<Credentials, CredentialError> {
    let fields = Fields { service, credentials };
    let name = fields.get("DBName")?;
    let host = fields.get("EndpointAddress")?;
    let port = fields.get("Port")?;
    let password = fields.get("MasterPassword")?;
    let username = fields.get("MasterUsername")?;

    let jdbc_url = format!(
        "jdbc:mysql://{host}:{port}/{name}?user={username}&password={password}&useSSL=false"
    );
    let uri = format!("mysql://{username}:{password}@{host}:{port}/{name}?reconnect=true");

    Ok(object([
        ("name", name),
        ("hostname", host.clone()),
        ("host", host),
        ("port", port),
        ("password", password),
        ("username", username),
        ("jdbcUrl", jdbc_url),
        ("uri", uri),
    ]))
}

fn postgresql(service: &str, credentials: &Credentials) -> Result<Credentials, CredentialError> {
    let fields = Fields { service, credentials };
    let name = fields.get("DBName")?;
    let host = fields.get("EndpointAddress")?;
    let port = fields.get("Port")?;
    let password = fields.get("MasterPassword")?;
    let username = fields.get("MasterUsername")?;

    let jdbc_uri = format!("jdbc:postgresql://{host}:{port}/{name}");
    let uri = format!("postgresql://{username}:{password}@{host}:{port}/{name}");

    Ok(object([
        ("db_host", host.clone()),
        ("db_name", name),
        ("db_port", port.clone()),
        ("host", host.clone()),
        ("hostname", host.clone()),
        ("jdbc_read_uri", jdbc_uri.clone()),
        ("jdbc_uri", jdbc_uri),
        ("password", password),
        ("port", port.clone()),
        ("read_host", host),
        ("read_port", port),
        ("read_uri", uri.clone()),
        ("uri", uri),
        ("username", username),
    ]))
}

/// Adds aliases alongside the original keys.
fn s3(service: &str, mut credentials: Credentials) -> Result<Credentials, CredentialError> {
    let fields = Fields {
        service,
        credentials: &credentials,
    };
    let access_key = fields.get("S3AwsAccessKeyId")?;
    let secret_key = fields.get("S3AwsSecretAccessKey")?;
    let arn = fields.get("BucketArn")?;

    credentials.insert("access_key_id".into(), Value::String(access_key));
    credentials.insert("secret_access_key".into(), Value::String(secret_key));
    credentials.insert("arn".into(), Value::String(arn));
    Ok(credentials)
}

fn object<const N: usize>(entries: [(&str, String); N]) -> Credentials {
    entries
        .into_iter()
        .map(|(key, value)| (key.to_string(), Value::String(value)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn creds(value: Value) -> Credentials {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    fn database() -> Credentials {
        creds(json!({
            "DBName": "orders",
            "EndpointAddress": "db.example.com",
            "Port": "5432",
            "MasterPassword": "pw",
            "MasterUsername": "admin",
        }))
    }

    #[test]
    fn mysql_urls() {
        let out = reshape("rdsmariadb", database()).unwrap();
        assert_eq!(
            out["jdbcUrl"],
            "jdbc:mysql://db.example.com:5432/orders?user=admin&password=pw&useSSL=false"
        );
        assert_eq!(out["uri"], "mysql://admin:pw@db.example.com:5432/orders?reconnect=true");
        assert_eq!(out["hostname"], "db.example.com");
        assert!(out.get("DBName").is_none(), "raw keys are replaced");
    }

    #[test]
    fn postgresql_urls() {
        let out = reshape("rdspostgresql", database()).unwrap();
        assert_eq!(out["jdbc_uri"], "jdbc:postgresql://db.example.com:5432/orders");
        assert_eq!(out["jdbc_read_uri"], out["jdbc_uri"]);
        assert_eq!(out["uri"], "postgresql://admin:pw@db.example.com:5432/orders");
        assert_eq!(out["read_uri"], out["uri"]);
        assert_eq!(out["db_port"], "5432");
    }

    #[test]
    fn s3_adds_aliases() {
        let out = reshape(
            "s3",
            creds(json!({
                "S3AwsAccessKeyId": "AKIA",
                "S3AwsSecretAccessKey": "secret",
                "BucketArn": "arn:aws:s3:::b",
                "BucketName": "b",
            })),
        )
        .unwrap();
        assert_eq!(out["access_key_id"], "AKIA");
        assert_eq!(out["arn"], "arn:aws:s3:::b");
        assert_eq!(out["BucketName"], "b");
    }

    #[test]
    fn missing_field_is_an_error() {
        let mut partial = database();
        partial.remove("Port");
        let err = reshape("rdsmysql", partial).unwrap_err();
        assert_eq!(err.to_string(), "output Port is required to build rdsmysql credentials");
    }

    #[test]
    fn other_services_pass_through() {
        let out = reshape("sqs", creds(json!({"QueueUrl": "q"}))).unwrap();
        assert_eq!(out["QueueUrl"], "q");
    }
}
