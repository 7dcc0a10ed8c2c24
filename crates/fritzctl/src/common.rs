use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use clap::Args;
use fritz_exporter::{collect_errors_counter, Catalog, Collector};
use prometheus::IntCounter;
use reqwest::Url;
use tracing::info;

pub const DEFAULT_UPNP_URL: &str = tr064::consts::DEFAULT_URL;
pub const DEFAULT_LUA_URL: &str = "http://fritz.box";
pub const DEFAULT_LISTEN_ADDRESS: &str = "127.0.0.1:9042";

/// Gateway connection and catalog options shared by every command.
#[derive(Args, Debug, Clone)]
pub struct GatewayArgs {
    /// TR-064 base URL of the gateway
    #[arg(long, global = true, env = "FRITZ_UPNP_URL", default_value = DEFAULT_UPNP_URL)]
    pub gateway_upnp_url: String,
    /// Web interface URL of the gateway; its host is the `gateway` label value
    #[arg(long, global = true, env = "FRITZ_LUA_URL", default_value = DEFAULT_LUA_URL)]
    pub gateway_lua_url: String,
    #[arg(long, global = true, env = "FRITZ_USERNAME", default_value = "")]
    pub username: String,
    #[arg(long, global = true, env = "FRITZ_PASSWORD", default_value = "", hide_env_values = true)]
    pub password: String,
    /// Catalog of TR-064 metrics; the TR-064 collector is only built when given
    #[arg(long, global = true, env = "FRITZ_METRICS_UPNP")]
    pub metrics_upnp: Option<PathBuf>,
    /// Catalog of Lua metrics; the Lua collector is only built when given
    #[arg(long, global = true, env = "FRITZ_METRICS_LUA")]
    pub metrics_lua: Option<PathBuf>,
}

impl GatewayArgs {
    pub fn credentials(&self) -> Option<tr064::Credentials> {
        tr064::Credentials::from_parts(&self.username, &self.password)
    }
}

/// Host part of the Lua URL, used as the `gateway` label value.
pub fn gateway_host(lua_url: &str) -> Result<String> {
    let url = Url::parse(lua_url).with_context(|| format!("parse gateway URL {lua_url}"))?;
    url.host_str()
        .map(str::to_string)
        .ok_or_else(|| anyhow!("gateway URL {lua_url} has no host"))
}

pub fn load_catalog(path: &Path) -> Result<Catalog> {
    let catalog = Catalog::load(path).with_context(|| format!("load catalog {}", path.display()))?;
    info!(path = %path.display(), metrics = catalog.metrics.len(), "catalog loaded");
    Ok(catalog)
}

/// Build one collector per configured catalog. Both count into the returned
/// error counter; at least one catalog is required.
pub async fn build_collectors(args: &GatewayArgs) -> Result<(Vec<Collector>, IntCounter)> {
    if args.metrics_upnp.is_none() && args.metrics_lua.is_none() {
        bail!("no metrics configured, pass --metrics-upnp and/or --metrics-lua");
    }
    let gateway = gateway_host(&args.gateway_lua_url)?;
    let errors = collect_errors_counter().context("create error counter")?;

    let mut collectors = Vec::with_capacity(2);
    if let Some(path) = &args.metrics_upnp {
        let catalog = load_catalog(path)?;
        let upnp = Collector::upnp(
            catalog,
            &args.gateway_upnp_url,
            args.credentials(),
            &gateway,
            errors.clone(),
        )
        .await
        .with_context(|| format!("connect to {}", args.gateway_upnp_url))?;
        collectors.push(upnp);
    }

    if let Some(path) = &args.metrics_lua {
        let catalog = load_catalog(path)?;
        let lua = Collector::lua(
            catalog,
            &args.gateway_lua_url,
            &args.username,
            &args.password,
            &gateway,
            errors.clone(),
        )
        .with_context(|| format!("create Lua session for {}", args.gateway_lua_url))?;
        collectors.push(lua);
    }
    Ok((collectors, errors))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gateway_label_is_lua_host() {
        assert_eq!(gateway_host("http://fritz.box").unwrap(), "fritz.box");
        assert_eq!(gateway_host("https://192.168.178.1:8443/").unwrap(), "192.168.178.1");
        assert!(gateway_host("fritz.box").is_err());
    }

    fn args(metrics_upnp: Option<PathBuf>, metrics_lua: Option<PathBuf>) -> GatewayArgs {
        GatewayArgs {
            // Unroutable, so a TR-064 collector could never be built.
            gateway_upnp_url: "http://127.0.0.1:9".into(),
            gateway_lua_url: "http://fritz.box".into(),
            username: "admin".into(),
            password: "secret".into(),
            metrics_upnp,
            metrics_lua,
        }
    }

    #[tokio::test]
    async fn lua_only_builds_without_tr064() {
        let path = std::env::temp_dir().join(format!("fritzctl-lua-{}.json", std::process::id()));
        std::fs::write(
            &path,
            r#"{"metrics":[{"promDesc":{"fqName":"gateway_uptime"},"page":"overview","resultPath":"data.uptime"}]}"#,
        )
        .expect("write catalog");

        let (collectors, errors) = build_collectors(&args(None, Some(path.clone())))
            .await
            .expect("lua collector");
        std::fs::remove_file(&path).ok();

        assert_eq!(collectors.len(), 1);
        assert_eq!(collectors[0].backend_name(), "lua");
        assert_eq!(errors.get(), 0);
    }

    #[tokio::test]
    async fn some_catalog_is_required() {
        let err = build_collectors(&args(None, None)).await.unwrap_err();
        assert!(err.to_string().contains("no metrics configured"));
    }
}
