// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use anyhow::Result;
use serial_test::serial;

use crate::integration_tests::common::{connect_or_skip, load_config};

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
#[serial]
async fn authenticated_handshake_and_call() -> Result<()> {
    let cfg = load_config()?;
    let Some(conn) = connect_or_skip(&cfg).await? else {
        return Ok(());
    };

    // The config carries jake/qwerty; construction already authenticated.
    let response = conn.call("setup", &[]).await?;
    assert!(response.header.is_ok());

    conn.ping().await?;
    conn.close().await;
    Ok(())
}
