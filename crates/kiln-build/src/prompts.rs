//! Fixed prompt text: the system instruction and the two starter templates.

/// Working directory the generated project assumes
pub const WORK_DIR: &str = "/home/project";

/// Design guidance prepended to react projects
pub const BASE_PROMPT: &str = "For all designs I ask you to make, have them be beautiful, not cookie cutter. \
Make webpages that are fully featured and worthy for production.\n\n\
By default, this template supports JSX syntax with Tailwind CSS classes, React hooks, and Lucide React for icons. \
Do not install other packages for UI themes, icons, etc unless absolutely necessary or I request them.\n\n\
Use icons from lucide-react for logos.\n\n\
Use stock photos from unsplash where appropriate, only valid URLs you know exist. Do not download the images, only link to them in image tags.\n\n";

/// Instruction appended to the user's prompt when classifying it
pub const CLASSIFY_SUFFIX: &str = "\nReturn either node or react based on what do you think this project should be. \
Only return a single word either 'node' or 'react'. Do not return anything extra";

/// Files the sandbox has that the model is not shown
pub const HIDDEN_FILES_NOTE: &str = "Here is a list of files that exist on the file system but are not being shown to you:\n\n  - .gitignore\n  - package-lock.json\n";

/// Starter artifact for a Vite + React + TypeScript project
pub const REACT_TEMPLATE: &str = r#"<boltArtifact id="project-import" title="Project Files">
<boltAction type="file" filePath="eslint.config.js">import js from '@eslint/js';
import globals from 'globals';
import reactHooks from 'eslint-plugin-react-hooks';
import reactRefresh from 'eslint-plugin-react-refresh';
import tseslint from 'typescript-eslint';

export default tseslint.config(
  { ignores: ['dist'] },
  {
    extends: [js.configs.recommended, ...tseslint.configs.recommended],
    files: ['**/*.{ts,tsx}'],
    languageOptions: {
      ecmaVersion: 2020,
      globals: globals.browser,
    },
    plugins: {
      'react-hooks': reactHooks,
      'react-refresh': reactRefresh,
    },
    rules: {
      ...reactHooks.configs.recommended.rules,
      'react-refresh/only-export-components': ['warn', { allowConstantExport: true }],
    },
  }
);</boltAction>
<boltAction type="file" filePath="index.html"><!doctype html>
<html lang="en">
  <head>
    <meta charset="UTF-8" />
    <link rel="icon" type="image/svg+xml" href="/vite.svg" />
    <meta name="viewport" content="width=device-width, initial-scale=1.0" />
    <title>Vite + React + TS</title>
  </head>
  <body>
    <div id="root"></div>
    <script type="module" src="/src/main.tsx"></script>
  </body>
</html></boltAction>
<boltAction type="file" filePath="package.json">{
  "name": "vite-react-typescript-starter",
  "private": true,
  "version": "0.0.0",
  "type": "module",
  "scripts": {
    "dev": "vite",
    "build": "vite build",
    "lint": "eslint .",
    "preview": "vite preview"
  },
  "dependencies": {
    "lucide-react": "^0.344.0",
    "react": "^18.3.1",
    "react-dom": "^18.3.1"
  },
  "devDependencies": {
    "@eslint/js": "^9.9.1",
    "@types/react": "^18.3.5",
    "@types/react-dom": "^18.3.0",
    "@vitejs/plugin-react": "^4.3.1",
    "autoprefixer": "^10.4.18",
    "eslint": "^9.9.1",
    "eslint-plugin-react-hooks": "^5.1.0-rc.0",
    "eslint-plugin-react-refresh": "^0.4.11",
    "globals": "^15.9.0",
    "postcss": "^8.4.35",
    "tailwindcss": "^3.4.1",
    "typescript": "^5.5.3",
    "typescript-eslint": "^8.3.0",
    "vite": "^5.4.2"
  }
}</boltAction>
<boltAction type="file" filePath="postcss.config.js">export default {
  plugins: {
    tailwindcss: {},
    autoprefixer: {},
  },
};</boltAction>
<boltAction type="file" filePath="tailwind.config.js">/** @type {import('tailwindcss').Config} */
export default {
  content: ['./index.html', './src/**/*.{js,ts,jsx,tsx}'],
  theme: {
    extend: {},
  },
  plugins: [],
};</boltAction>
<boltAction type="file" filePath="tsconfig.json">{
  "compilerOptions": {
    "target": "ES2020",
    "useDefineForClassFields": true,
    "lib": ["ES2020", "DOM", "DOM.Iterable"],
    "module": "ESNext",
    "skipLibCheck": true,
    "moduleResolution": "bundler",
    "allowImportingTsExtensions": true,
    "isolatedModules": true,
    "moduleDetection": "force",
    "noEmit": true,
    "jsx": "react-jsx",
    "strict": true
  },
  "include": ["src"]
}</boltAction>
<boltAction type="file" filePath="vite.config.ts">import { defineConfig } from 'vite';
import react from '@vitejs/plugin-react';

// https://vitejs.dev/config/
export default defineConfig({
  plugins: [react()],
  optimizeDeps: {
    exclude: ['lucide-react'],
  },
});</boltAction>
<boltAction type="file" filePath="src/App.tsx">function App() {
  return (
    <div className="min-h-screen bg-gray-100 flex items-center justify-center">
      <p>Start prompting (or editing) to see magic happen :)</p>
    </div>
  );
}

export default App;</boltAction>
<boltAction type="file" filePath="src/index.css">@tailwind base;
@tailwind components;
@tailwind utilities;</boltAction>
<boltAction type="file" filePath="src/main.tsx">import { StrictMode } from 'react';
import { createRoot } from 'react-dom/client';
import App from './App.tsx';
import './index.css';

createRoot(document.getElementById('root')!).render(
  <StrictMode>
    <App />
  </StrictMode>
);</boltAction>
<boltAction type="file" filePath="src/vite-env.d.ts">/// <reference types="vite/client" /></boltAction>
</boltArtifact>"#;

/// Starter artifact for a plain Node.js project
pub const NODE_TEMPLATE: &str = r#"<boltArtifact id="project-import" title="Project Files">
<boltAction type="file" filePath="index.js">// run `node index.js` in the terminal

console.log(`Hello Node.js v${process.versions.node}!`);</boltAction>
<boltAction type="file" filePath="package.json">{
  "name": "node-starter",
  "private": true,
  "scripts": {
    "dev": "node index.js",
    "test": "echo \"Error: no test specified\" && exit 1"
  }
}</boltAction>
</boltArtifact>"#;

/// The fixed system instruction sent as the first message of every chat
pub fn system_prompt() -> String {
    format!(
        r#"You are Kiln, an expert AI assistant and exceptional senior software developer with vast knowledge across multiple programming languages, frameworks, and best practices.

<system_constraints>
  You are operating in an in-browser sandbox that emulates a Linux system. It runs Node.js and npm. There is no native binary support, no pip, no C/C++ compiler and no git.
  Prefer Vite for web servers. Prefer libraries that do not need native binaries.
</system_constraints>

<artifact_info>
  Create a single, comprehensive artifact for each project. The artifact contains all necessary steps and components, including:

  - Shell commands to run, including dependencies to install with a package manager (npm)
  - Files to create and their full contents
  - Folders to create if necessary

  <artifact_instructions>
    1. Think holistically before creating an artifact: consider all relevant files of the project, review all previous file changes and user modifications, and analyze the entire project context and dependencies.
    2. The current working directory is `{WORK_DIR}`.
    3. Wrap the content in opening and closing `<boltArtifact>` tags. These tags contain more specific `<boltAction>` elements.
    4. Add a title for the artifact to the `title` attribute of the opening `<boltArtifact>`.
    5. Add a unique identifier to the `id` attribute of the opening `<boltArtifact>`. Use kebab-case.
    6. Use `<boltAction>` tags to define specific actions to perform.
    7. For each `<boltAction>`, add a type to the `type` attribute. Assign one of the following values:
      - shell: For running shell commands.
      - file: For writing new files or updating existing files. Add a `filePath` attribute with a path relative to the current working directory. The content of the action is the file contents.
      - folder: For creating an empty folder. Add a `filePath` attribute.
    8. The order of the actions is VERY IMPORTANT. Create a file before running a command that uses it.
    9. Always install necessary dependencies FIRST before generating any other artifact, updating `package.json` when needed.
    10. CRITICAL: Always provide the FULL, updated content of a file. Never use placeholders like "// rest of the code remains the same...".
    11. Never escape the contents of a file; they are written byte for byte.
  </artifact_instructions>
</artifact_info>

NEVER use the word "artifact" in prose. Do NOT be verbose and do NOT explain anything unless the user asks for more information. Respond with the artifact first."#
    )
}

/// The prompt that presents the starter files to the model
pub fn project_files_prompt(template: &str) -> String {
    format!(
        "Here is an artifact that contains all files of the project visible to you.\nConsider the contents of ALL files in the project.\n\n{}\n\n{}",
        template, HIDDEN_FILES_NOTE
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::step::{self, StepKind};

    #[test]
    fn test_templates_parse_into_file_steps() {
        for template in [REACT_TEMPLATE, NODE_TEMPLATE] {
            let steps = step::parse(template);
            assert!(!steps.is_empty());
            assert!(steps.iter().all(|s| s.kind() == &StepKind::CreateFile));
            assert!(steps.iter().any(|s| s.path() == Some("package.json")));
        }
    }

    #[test]
    fn test_react_template_has_entry_point() {
        let steps = step::parse(REACT_TEMPLATE);
        let main = steps.iter().find(|s| s.path() == Some("src/main.tsx")).unwrap();
        assert!(main.payload().unwrap().contains("createRoot"));
    }

    #[test]
    fn test_system_prompt_teaches_protocol() {
        let prompt = system_prompt();
        assert!(prompt.contains(step::ARTIFACT_TAG));
        assert!(prompt.contains(step::ACTION_TAG));
        assert!(prompt.contains(WORK_DIR));
    }
}
