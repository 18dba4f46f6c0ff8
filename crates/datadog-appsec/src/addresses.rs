// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Well-known address names rules can target.

pub const REQUEST_URI_RAW: &str = "server.request.uri.raw";
pub const REQUEST_METHOD: &str = "server.request.method";
pub const REQUEST_QUERY: &str = "server.request.query";
pub const REQUEST_HEADERS_NO_COOKIES: &str = "server.request.headers.no_cookies";
pub const REQUEST_COOKIES: &str = "server.request.cookies";
pub const REQUEST_PATH_PARAMS: &str = "server.request.path_params";
pub const REQUEST_BODY: &str = "server.request.body";
pub const REQUEST_CLIENT_IP: &str = "http.client_ip";
pub const RESPONSE_STATUS: &str = "server.response.status";
pub const RESPONSE_HEADERS_NO_COOKIES: &str = "server.response.headers.no_cookies";
