// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use crate::errors::SupervisorError;
use crate::fields::{AUTODISCOVER, Artifact, ConfigurationSet, FieldSpec, Schema};

pub const DEFAULT_PROGRAM: &str = "java";
pub const DEFAULT_LAUNCH_ARGS: &[&str] = &["-jar"];
pub const DEFAULT_ARTIFACT_DIR: &str = "../../ASI";
pub const DEFAULT_ARTIFACT_NAME: &str = "serval-4.1.1-rc1.jar";

const MAX_PORT: i64 = 65535;

/// Field table of the Serval detector server, in command line order.
pub fn serval() -> Schema {
    Schema::new(vec![
        FieldSpec::integer("httpPort", "HTTP_PORT", "HTTP port", 8081)
            .range(0, MAX_PORT)
            .enabled(true)
            .mandatory(),
        FieldSpec::integer(
            "resourcePoolSize",
            "RESOURCE_POOL_SIZE",
            "Resource pool size",
            524288,
        )
        .enabled(true),
        FieldSpec::text("httpLog", "HTTP_LOG", "HTTP log path", ""),
        FieldSpec::text("spidrNet", "SPIDR_NET", "SPIDR net", AUTODISCOVER),
        FieldSpec::text("tcpIp", "TCP_IP", "TCP IP", AUTODISCOVER),
        FieldSpec::integer("tcpPort", "TCP_PORT", "TCP port", 50000)
            .range(0, MAX_PORT)
            .enabled(true)
            .worker_default(50000),
        FieldSpec::integer("deviceMask", "DEVICE_MASK", "Device mask", 0),
        FieldSpec::integer("udpReceivers", "UDP_RECEIVERS", "UDP receivers", 0),
        FieldSpec::integer(
            "frameAssemblers",
            "FRAME_ASSEMBLERS",
            "Frame assemblers",
            0,
        ),
        FieldSpec::integer(
            "ringBufferSize",
            "RING_BUFFER_SIZE",
            "Ring buffer size",
            0,
        ),
        FieldSpec::integer(
            "networkBufferSize",
            "NETWORK_BUFFER_SIZE",
            "Network buffer size",
            0,
        ),
        FieldSpec::integer("fileWriters", "FILE_WRITERS", "File writers", 0),
        FieldSpec::integer(
            "correctionHandlers",
            "CORRECTION_HANDLERS",
            "Correction handlers",
            0,
        ),
        FieldSpec::integer(
            "processingHandlers",
            "PROCESSING_HANDLERS",
            "Processing handlers",
            0,
        ),
        FieldSpec::integer("imagePoolSize", "IMAGE_POOL_SIZE", "Image pool size", 0),
        FieldSpec::integer(
            "integrationPoolSize",
            "INTEGRATION_POOL_SIZE",
            "Integration pool size",
            0,
        ),
        FieldSpec::text("tcpDebug", "TCP_DEBUG", "TCP debug path", ""),
        FieldSpec::flag("releaseResources", "RELEASE_RESOURCES", "Release resources"),
        FieldSpec::flag("experimental", "EXPERIMENTAL", "Experimental mode"),
    ])
}

/// `java -jar ../../ASI/serval-4.1.1-rc1.jar` with the Serval field table.
pub fn default_configuration() -> Result<ConfigurationSet, SupervisorError> {
    ConfigurationSet::new(DEFAULT_PROGRAM, serval())?
        .with_launch_args(DEFAULT_LAUNCH_ARGS.iter().copied())
        .with_artifact(Artifact::new(DEFAULT_ARTIFACT_DIR, DEFAULT_ARTIFACT_NAME))
}
