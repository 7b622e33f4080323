//! nginx reverse-proxy vhost rendering

use crate::error::Result;
use tera::{Context, Tera};

const VHOST_TEMPLATE: &str = r#"server {
    listen 80;
    listen [::]:80;
    server_name {{ server_name }};

    client_max_body_size 512m;

    location / {
        proxy_pass http://127.0.0.1:{{ port }};
        proxy_set_header Host $host;
        proxy_set_header X-Real-IP $remote_addr;
        proxy_set_header X-Forwarded-For $proxy_add_x_forwarded_for;
        proxy_set_header X-Forwarded-Proto $scheme;
        proxy_http_version 1.1;
        proxy_set_header Upgrade $http_upgrade;
        proxy_set_header Connection "upgrade";
        proxy_read_timeout 90s;
    }
}
"#;

/// Render the plain-HTTP vhost fronting one service. certbot rewrites it
/// in place when certificates are issued.
pub fn render_vhost(server_name: &str, port: u16) -> Result<String> {
    let mut context = Context::new();
    context.insert("server_name", server_name);
    context.insert("port", &port);

    let mut tera = Tera::default();
    Ok(tera.render_str(VHOST_TEMPLATE, &context)?)
}

/// Path the vhost for a role is written to. nginx on Ubuntu includes
/// conf.d by default.
pub fn vhost_path(role: &str) -> String {
    format!("/etc/nginx/conf.d/forge-{}.conf", role)
}
