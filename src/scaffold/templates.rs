//! File templates for new tools.
//!
//! Rendered with `Tera::one_off` against a context of `name`, `name_title`,
//! `class_name`, `description` and `category`. Text that lands inside a
//! Python string literal goes through `json_encode`, whose output is also a
//! valid Python literal.

/// Python entry point, written to `xwtools/<category>/<name>.py`.
pub const TOOL_TEMPLATE: &str = r#"#!/usr/bin/env python3
"""
{{ name }}.py - {{ description }}

A {{ category }} tool for the XwDevTools repository.
"""

import argparse
import sys


def main():
    """Main entry point for the {{ name }} tool."""
    parser = argparse.ArgumentParser(
        description={{ description | json_encode() }}
    )

    # Add arguments here
    parser.add_argument("--example", help="Example argument")

    args = parser.parse_args()

    # Your implementation here
    print("Hello from {{ name }}!")

    return 0


if __name__ == "__main__":
    sys.exit(main())
"#;

/// Markdown documentation, written to `docs/tools/<name>.md`.
pub const DOC_TEMPLATE: &str = r#"# {{ name_title }}

## Description

{{ description }}

## Installation

No special installation required. Ensure you have access to the XwDevTools repository.

## Usage

```bash
./xwtools/{{ category }}/{{ name }}.py --example value
```

## Arguments

| Argument | Description | Required | Default |
|----------|-------------|----------|---------|
| --example | Example argument | No | None |

## Examples

Basic usage:

```bash
./xwtools/{{ category }}/{{ name }}.py --example test
```

## Configuration

This tool reads configuration from environment variables:

```
# Required in .env file
API_KEY=your_api_key_here
```

## Notes

- Handles errors gracefully
- Returns non-zero exit code on failure
"#;

/// unittest suite, written to `tests/test_<name>.py`.
pub const TEST_TEMPLATE: &str = r#"#!/usr/bin/env python3
"""
Test suite for {{ name }}.py
"""

import os
import sys
import unittest
from unittest.mock import patch

sys.path.append(os.path.abspath(os.path.join(os.path.dirname(__file__), '..')))

from xwtools.{{ category }}.{{ name }} import main


class Test{{ class_name }}(unittest.TestCase):
    """Test cases for {{ name }}.py"""

    def setUp(self):
        pass

    def tearDown(self):
        pass

    def test_main_function(self):
        """Test that the main function runs without errors"""
        with patch('sys.argv', ['xwtools/{{ category }}/{{ name }}.py', '--example', 'test']):
            result = main()
            self.assertEqual(result, 0)


if __name__ == "__main__":
    unittest.main()
"#;
